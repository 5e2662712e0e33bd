//! Configuration parsing and validation.

use std::io::Write;
use teagarden_client::{ClientConfig, ConfigError};

const VALID: &str = r#"
api_base_url = "http://localhost:5000/api"
request_timeout_ms = 10000
token_path = "/tmp/teagarden/token.json"

[store]
load_attempts = 3
history_limit = 100

[log]
filter = "teagarden_client=debug,info"
json = true
"#;

fn with(replace: &str, by: &str) -> String {
    VALID.replace(replace, by)
}

fn invalid_field(contents: &str) -> &'static str {
    let config = ClientConfig::from_toml(contents).unwrap();
    match config.validate() {
        Err(ConfigError::InvalidValue { field, .. }) => field,
        other => panic!("expected an invalid value, got {:?}", other),
    }
}

#[test]
fn test_valid_config_parses() {
    let config = ClientConfig::from_toml(VALID).unwrap();
    config.validate().unwrap();
    assert_eq!(config.api_base_url, "http://localhost:5000/api");
    assert_eq!(config.store.load_attempts, 3);
    assert!(config.log.json);
}

#[test]
fn test_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(VALID.as_bytes()).unwrap();

    let config = ClientConfig::from_path(file.path()).unwrap();
    assert_eq!(config.request_timeout_ms, 10000);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ClientConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_missing_and_unknown_fields_are_rejected() {
    let missing = with("request_timeout_ms = 10000\n", "");
    assert!(matches!(
        ClientConfig::from_toml(&missing),
        Err(ConfigError::Parse(_))
    ));

    let unknown = with("[log]\n", "[log]\ncolour = true\n");
    assert!(matches!(
        ClientConfig::from_toml(&unknown),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_invalid_values() {
    assert_eq!(
        invalid_field(&with("http://localhost:5000/api", "localhost:5000")),
        "api_base_url"
    );
    assert_eq!(
        invalid_field(&with("http://localhost:5000/api", "  ")),
        "api_base_url"
    );
    assert_eq!(
        invalid_field(&with("request_timeout_ms = 10000", "request_timeout_ms = 0")),
        "request_timeout_ms"
    );
    assert_eq!(
        invalid_field(&with("/tmp/teagarden/token.json", "")),
        "token_path"
    );
    assert_eq!(
        invalid_field(&with("load_attempts = 3", "load_attempts = 0")),
        "store.load_attempts"
    );
    assert_eq!(
        invalid_field(&with("history_limit = 100", "history_limit = 0")),
        "store.history_limit"
    );
    assert_eq!(
        invalid_field(&with("teagarden_client=debug,info", "")),
        "log.filter"
    );
}
