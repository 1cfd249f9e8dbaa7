//! Per-ticker OHLCV aggregation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{nano_id, Ohlcv, Tick};

/// Folds ticks into one open candle per ticker and releases the closed
/// candles at interval boundaries. An interval that saw no ticks on a ticker
/// produces no candle for it.
///
/// The book itself is clock-free; the exchange worker drives it with ticks
/// and a periodic [`CandleBook::close_all`].
#[derive(Debug)]
pub struct CandleBook {
    interval: Duration,
    open: HashMap<String, OpenCandle>,
}

#[derive(Debug)]
struct OpenCandle {
    candle: Ohlcv,
    close: f64,
}

impl CandleBook {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            open: HashMap::new(),
        }
    }

    /// Folds one tick into its ticker's open candle, starting one if the
    /// ticker has none this interval.
    pub fn apply(&mut self, tick: &Tick) {
        let entry = self
            .open
            .entry(tick.ticker.clone())
            .or_insert_with(|| OpenCandle {
                candle: Ohlcv {
                    id: nano_id(),
                    ticker: tick.ticker.clone(),
                    time: Utc::now(),
                    interval: self.interval,
                    open: tick.price,
                    high: tick.price,
                    low: tick.price,
                    close: tick.price,
                    volume: 0,
                },
                close: tick.price,
            });

        if tick.price > entry.candle.high {
            entry.candle.high = tick.price;
        }
        if tick.price < entry.candle.low {
            entry.candle.low = tick.price;
        }
        entry.candle.volume += tick.volume;
        entry.close = tick.price;
    }

    /// Closes and returns every open candle, ordered by ticker so emission
    /// order is stable.
    pub fn close_all(&mut self) -> Vec<Ohlcv> {
        let mut closed: Vec<Ohlcv> = self
            .open
            .drain()
            .map(|(_, open)| {
                let mut candle = open.candle;
                candle.close = open.close;
                candle
            })
            .collect();
        closed.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        closed
    }
}
