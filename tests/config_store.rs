//! File-backed configuration store tests.

use chrono::{TimeZone, Utc};
use tda_rs::config::{ConfigStore, Configuration, FileConfigStore};
use tda_rs::error::TdaError;

#[tokio::test]
async fn saves_pretty_json_and_loads_it_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileConfigStore::new(dir.path().join(".tradingutility"));

    let config = Configuration::new("APPKEY@AMER.OAUTHAP", "https://127.0.0.1", "code/with+chars")
        .with_refresh_token("R1", Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
    store.save(&config).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains('\n'), "expected pretty-printed JSON");
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["clientId"], "APPKEY@AMER.OAUTHAP");
    assert_eq!(
        json["authorizationCodeContent"],
        "https://127.0.0.1/?code=code%2Fwith%2Bchars"
    );
    assert_eq!(json["refreshTokenExpiry"], 1_700_000_000_000_i64);

    assert_eq!(store.load().unwrap(), config);
}

#[test]
fn loads_a_hand_written_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "clientId": "KEY",
            "redirectUri": "https://localhost",
            "authorizationCodeContent": "https://localhost/?code=abc%3D%3D"
        }"#,
    )
    .unwrap();

    let config = FileConfigStore::new(&path).load().unwrap();
    assert_eq!(config.authorization_code, "abc==");
    assert_eq!(config.refresh_token, None);
    assert_eq!(config.refresh_token_expiry, None);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileConfigStore::new(dir.path().join("absent"));
    assert!(matches!(store.load(), Err(TdaError::Io(_))));
}
