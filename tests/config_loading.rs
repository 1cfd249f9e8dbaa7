//! Integration test: configuration loading and validation.

use std::io::Write;

use trading_venue::config::{Config, ConfigError};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const VALID: &str = r#"
exchange:
  listen_addr: 127.0.0.1:8000
  tickers:
    - SPFB.RTS
  interval_secs: 5
  base_inventory: 1000

broker:
  listen_addr: 127.0.0.1:8001
  exchange_addr: http://127.0.0.1:8000
  broker_id: 1
  db:
    host: localhost
    user: postgres
    password: postgres
    db_name: trading

client:
  broker_addr: http://127.0.0.1:8001
  login: console
"#;

#[test]
fn loads_a_valid_config() {
    let file = write_config(VALID);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.exchange.tickers, vec!["SPFB.RTS"]);
    assert_eq!(config.exchange.interval().as_secs(), 5);
    // Defaults kick in for omitted fields.
    assert_eq!(config.exchange.assets_dir, "assets");
    assert_eq!(config.broker.db.port, 5432);
}

#[test]
fn ships_a_loadable_default_config() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/configs/default.yaml")).unwrap();

    assert!(!config.exchange.tickers.is_empty());
    assert_eq!(config.broker.broker_id, 1);
}

#[test]
fn rejects_an_empty_ticker_list() {
    let file = write_config(&VALID.replace("    - SPFB.RTS\n", "").replace(
        "  tickers:",
        "  tickers: []",
    ));

    match Config::load(file.path()) {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("ticker")),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn rejects_a_zero_interval() {
    let file = write_config(&VALID.replace("interval_secs: 5", "interval_secs: 0"));
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn rejects_negative_base_inventory() {
    let file = write_config(&VALID.replace("base_inventory: 1000", "base_inventory: -1"));
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn surfaces_yaml_errors() {
    let file = write_config("exchange: [not, a, mapping");
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::YamlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        Config::load("does/not/exist.yaml"),
        Err(ConfigError::FileError(_))
    ));
}
