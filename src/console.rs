//! Terminal console for the broker service.
//!
//! Speaks the same command set as the original dialog front-end: profile,
//! create, cancel and statistic, one command per line.

use std::io::Write as _;
use std::time::Duration;

use chrono::DateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;
use tonic::transport::Channel;
use venue_proto as proto;
use venue_proto::broker_client::BrokerClient;

const UNARY_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "commands:
  profile
  create <ticker> <BUY|SELL> <amount> <price>
  cancel <deal-id>
  statistic <ticker>
  quit";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Profile,
    Create {
        ticker: String,
        deal_type: String,
        amount: i32,
        price: f64,
    },
    Cancel {
        deal_id: i64,
    },
    Statistic {
        ticker: String,
    },
    Help,
    Quit,
}

/// Parses one input line. Errors are ready-to-print usage strings.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(USAGE.to_string());
    };
    let rest: Vec<&str> = parts.collect();

    match head {
        "profile" => Ok(Command::Profile),
        "create" => {
            let [ticker, deal_type, amount, price] = rest[..] else {
                return Err("usage: create <ticker> <BUY|SELL> <amount> <price>".to_string());
            };

            let deal_type = deal_type.to_uppercase();
            if deal_type != "BUY" && deal_type != "SELL" {
                return Err(format!("deal type must be BUY or SELL, got {deal_type:?}"));
            }

            let amount: i32 = amount.parse().map_err(|_| format!("bad amount: {amount}"))?;
            if amount <= 0 {
                return Err("amount must be positive".to_string());
            }
            let price: f64 = price.parse().map_err(|_| format!("bad price: {price}"))?;
            if price <= 0.0 {
                return Err("price must be positive".to_string());
            }

            Ok(Command::Create {
                ticker: ticker.to_string(),
                deal_type,
                amount,
                price,
            })
        }
        "cancel" => {
            let [deal_id] = rest[..] else {
                return Err("usage: cancel <deal-id>".to_string());
            };
            let deal_id: i64 = deal_id
                .parse()
                .map_err(|_| format!("bad deal id: {deal_id}"))?;

            Ok(Command::Cancel { deal_id })
        }
        "statistic" | "stat" => {
            let [ticker] = rest[..] else {
                return Err("usage: statistic <ticker>".to_string());
            };

            Ok(Command::Statistic {
                ticker: ticker.to_string(),
            })
        }
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command: {other}\n{USAGE}")),
    }
}

/// Console session bound to one login.
pub struct Console {
    login: String,
    client: BrokerClient<Channel>,
}

impl Console {
    pub async fn connect(addr: String, login: String) -> anyhow::Result<Self> {
        let client = BrokerClient::connect(addr).await?;

        Ok(Self { login, client })
    }

    /// Reads commands from stdin until quit or EOF.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("logged in as {}", self.login);
        println!("{USAGE}");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(Command::Help) => println!("{USAGE}"),
                Ok(command) => match self.execute(command).await {
                    Ok(output) => println!("{output}"),
                    Err(err) => println!("request failed: {err}"),
                },
                Err(usage) => println!("{usage}"),
            }
        }

        Ok(())
    }

    fn client_login(&self) -> Option<proto::ClientLogin> {
        Some(proto::ClientLogin {
            login: self.login.clone(),
        })
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<String> {
        match command {
            Command::Profile => {
                let request = proto::ClientLogin {
                    login: self.login.clone(),
                };
                let profile = timeout(UNARY_TIMEOUT, self.client.get_profile(request))
                    .await??
                    .into_inner();

                Ok(render_profile(&profile))
            }
            Command::Create {
                ticker,
                deal_type,
                amount,
                price,
            } => {
                let request = proto::CreateDeal {
                    client: self.client_login(),
                    ticker,
                    deal_type,
                    amount,
                    price,
                };
                let id = timeout(UNARY_TIMEOUT, self.client.create(request))
                    .await??
                    .into_inner()
                    .id;

                Ok(format!("deal {id} accepted"))
            }
            Command::Cancel { deal_id } => {
                let request = proto::CancelDeal {
                    client: self.client_login(),
                    deal_id,
                };
                let ok = timeout(UNARY_TIMEOUT, self.client.cancel(request))
                    .await??
                    .into_inner()
                    .ok;

                Ok(if ok {
                    format!("deal {deal_id} canceled")
                } else {
                    format!("deal {deal_id} was not found on the exchange")
                })
            }
            Command::Statistic { ticker } => {
                let request = proto::TickerRequest {
                    client: self.client_login(),
                    name: ticker.clone(),
                };
                let history = timeout(UNARY_TIMEOUT, self.client.statistic(request))
                    .await??
                    .into_inner();

                Ok(render_history(&ticker, &history))
            }
            Command::Help | Command::Quit => Ok(USAGE.to_string()),
        }
    }
}

fn render_profile(profile: &proto::Profile) -> String {
    let mut out = format!("balance: {:.2}", profile.balance);

    if profile.positions.is_empty() {
        out.push_str("\npositions: none");
    } else {
        out.push_str("\npositions:");
        for position in &profile.positions {
            out.push_str(&format!("\n  {:<12} {}", position.ticker, position.amount));
        }
    }

    if profile.deals.is_empty() {
        out.push_str("\nopen deals: none");
    } else {
        out.push_str("\nopen deals:");
        for deal in &profile.deals {
            out.push_str(&format!(
                "\n  #{} {} {} {} @ {:.2}",
                deal.id, deal.ticker, deal.deal_type, deal.amount, deal.price
            ));
        }
    }

    out
}

fn render_history(ticker: &str, history: &proto::History) -> String {
    if history.prices.is_empty() {
        return format!("no candles stored for {ticker}");
    }

    let mut out = format!("last {} candles for {}:", history.prices.len(), ticker);
    for candle in &history.prices {
        out.push_str(&format!(
            "\n  {} o={:.2} h={:.2} l={:.2} c={:.2} v={}",
            format_time(candle.time),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        ));
    }

    out
}

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
