//! Historical tape replay.

use std::path::PathBuf;

use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::Tick;
use crate::error::{ExchangeError, Result};

const TIME_IDX: usize = 3;
const PRICE_IDX: usize = 4;
const VOLUME_IDX: usize = 5;

/// Replays a ticker's historical tick file at a cadence of one tick group
/// per second, where a group is a maximal run of rows sharing an HHMMSS
/// timestamp.
#[derive(Debug, Clone)]
pub struct TickReader {
    assets_dir: PathBuf,
}

impl TickReader {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    /// Reads `<assets>/<TICKER>.txt` and emits its ticks onto `out`.
    ///
    /// Rows older than the current wall time are skipped, so the simulator
    /// rejoins the tape at the moment the process started.
    pub async fn start_reading(
        &self,
        token: CancellationToken,
        ticker: &str,
        out: mpsc::Sender<Tick>,
    ) {
        let since = Local::now().format("%H%M%S").to_string();
        self.read_from(token, ticker, out, &since).await;
    }

    async fn read_from(
        &self,
        token: CancellationToken,
        ticker: &str,
        out: mpsc::Sender<Tick>,
        since: &str,
    ) {
        let path = self.assets_dir.join(format!("{ticker}.txt"));
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) => {
                error!(ticker, path = %path.display(), %err, "failed to open tick file");
                return;
            }
        };

        let mut lines = BufReader::new(file).lines();

        // The first row is a header.
        match lines.next_line().await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(err) => {
                error!(ticker, %err, "failed to read tick file");
                return;
            }
        }

        let mut clock = time::interval_at(
            Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buffered: Option<Vec<String>> = None;

        info!(ticker, "started");

        loop {
            let row = match buffered.take() {
                Some(row) => row,
                None => match lines.next_line().await {
                    Ok(Some(line)) => split_row(&line),
                    Ok(None) => break,
                    Err(err) => {
                        error!(ticker, %err, "failed to read tick file");
                        break;
                    }
                },
            };

            let Some(group_time) = row_time(&row) else {
                error!(ticker, "dropping tick row: missing timestamp");
                continue;
            };
            if group_time < since {
                continue;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!(ticker, "stopped");
                    return;
                }
                _ = clock.tick() => {
                    match parse_tick(&row, ticker) {
                        Ok(tick) => {
                            if out.send(tick).await.is_err() {
                                info!(ticker, "stopped");
                                return;
                            }
                        }
                        Err(err) => error!(ticker, %err, "dropping tick row"),
                    }

                    // Drain the rest of the same-second group; the first row
                    // of the next group is buffered for the next clock tick.
                    loop {
                        let line = match lines.next_line().await {
                            Ok(Some(line)) => line,
                            Ok(None) => break,
                            Err(err) => {
                                error!(ticker, %err, "failed to read tick file");
                                break;
                            }
                        };

                        let next = split_row(&line);
                        let same_group = row_time(&next).map(|time| time == group_time);
                        match same_group {
                            Some(true) => match parse_tick(&next, ticker) {
                                Ok(tick) => {
                                    if out.send(tick).await.is_err() {
                                        info!(ticker, "stopped");
                                        return;
                                    }
                                }
                                Err(err) => error!(ticker, %err, "dropping tick row"),
                            },
                            Some(false) => {
                                buffered = Some(next);
                                break;
                            }
                            None => error!(ticker, "dropping tick row: missing timestamp"),
                        }
                    }
                }
            }
        }

        info!(ticker, "tape finished");
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',').map(|field| field.trim().to_string()).collect()
}

fn row_time(row: &[String]) -> Option<&str> {
    row.get(TIME_IDX).map(String::as_str)
}

fn parse_tick(row: &[String], ticker: &str) -> Result<Tick> {
    let price = row
        .get(PRICE_IDX)
        .ok_or_else(|| ExchangeError::BadRow("missing price field".to_string()))?;
    let price: f64 = price
        .parse()
        .map_err(|_| ExchangeError::BadRow(format!("bad price {price:?}")))?;

    let volume = row
        .get(VOLUME_IDX)
        .ok_or_else(|| ExchangeError::BadRow("missing volume field".to_string()))?;
    let volume: i32 = volume
        .parse()
        .map_err(|_| ExchangeError::BadRow(format!("bad volume {volume:?}")))?;

    Ok(Tick {
        ticker: ticker.to_string(),
        price,
        volume,
    })
}
