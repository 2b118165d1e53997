//! Persisted configuration for the token manager.
//!
//! The record holds the OAuth2 application settings (client id, redirect
//! URI), the authorization code pasted from the browser redirect, and the
//! current refresh token with its expiry. It is loaded once when a
//! [`TokenManager`](crate::token::TokenManager) is built and saved after every
//! successful authorization-code exchange and on `stop()`.
//!
//! # File format
//!
//! ```json
//! {
//!   "clientId": "APPKEY@AMER.OAUTHAP",
//!   "redirectUri": "https://127.0.0.1",
//!   "authorizationCodeContent": "https://127.0.0.1/?code=abc%2Bdef",
//!   "refreshToken": "...",
//!   "refreshTokenExpiry": 1700000000000
//! }
//! ```
//!
//! `authorizationCodeContent` is the redirect URL exactly as the browser
//! showed it; the authorization code is recovered by stripping the
//! `{redirectUri}/?code=` prefix and URL-decoding the remainder.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CONFIG_FILE_NAME;
use crate::error::{Result, TdaError};

// ---------------------------------------------------------------------------
// Configuration record
// ---------------------------------------------------------------------------

/// OAuth2 settings and the persisted refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    /// OAuth2 client id (the application's consumer key).
    pub client_id: String,
    /// Redirect URI registered for the application.
    pub redirect_uri: String,
    /// Authorization code obtained from the browser login.
    pub authorization_code: String,
    /// Refresh token from the most recent authorization-code exchange.
    pub refresh_token: Option<String>,
    /// Expiry of [`refresh_token`](Self::refresh_token).
    pub refresh_token_expiry: Option<DateTime<Utc>>,
}

impl Configuration {
    /// Create a configuration with no persisted refresh token.
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        authorization_code: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            authorization_code: authorization_code.into(),
            refresh_token: None,
            refresh_token_expiry: None,
        }
    }

    /// Attach a persisted refresh token and its expiry.
    pub fn with_refresh_token(
        mut self,
        refresh_token: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self.refresh_token_expiry = Some(expiry);
        self
    }

    /// Remaining lifetime of the persisted refresh token at `now`.
    ///
    /// Returns `None` when there is no refresh token, no expiry, or less than
    /// one whole second left.
    pub fn refresh_token_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.refresh_token.as_ref()?;
        let expiry = self.refresh_token_expiry?;
        let secs = (expiry - now).num_seconds();
        (secs > 0).then(|| Duration::from_secs(secs as u64))
    }

    fn to_record(&self) -> ConfigRecord {
        let encoded_code: String =
            url::form_urlencoded::byte_serialize(self.authorization_code.as_bytes()).collect();
        ConfigRecord {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            authorization_code_content: format!("{}/?code={}", self.redirect_uri, encoded_code),
            refresh_token: self.refresh_token.clone(),
            refresh_token_expiry: self.refresh_token_expiry.map(|t| t.timestamp_millis()),
        }
    }

    fn from_record(record: ConfigRecord) -> Result<Self> {
        let prefix = format!("{}/?code=", record.redirect_uri);
        let raw_code = record
            .authorization_code_content
            .strip_prefix(&prefix)
            .ok_or_else(|| {
                TdaError::Config(format!(
                    "authorizationCodeContent does not start with {prefix:?}"
                ))
            })?;
        let authorization_code: String = url::form_urlencoded::parse(format!("c={raw_code}").as_bytes())
            .find(|(k, _)| k == "c")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        let refresh_token_expiry = match record.refresh_token_expiry {
            Some(millis) => Some(Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                TdaError::Config(format!("refreshTokenExpiry out of range: {millis}"))
            })?),
            None => None,
        };

        Ok(Self {
            client_id: record.client_id,
            redirect_uri: record.redirect_uri,
            authorization_code,
            refresh_token: record.refresh_token,
            refresh_token_expiry,
        })
    }
}

/// On-disk shape of [`Configuration`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigRecord {
    client_id: String,
    redirect_uri: String,
    authorization_code_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token_expiry: Option<i64>,
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Durable storage for the [`Configuration`] record.
pub trait ConfigStore: Send + Sync + 'static {
    /// Load the persisted record.
    fn load(&self) -> Result<Configuration>;

    /// Persist the record, replacing any previous one.
    ///
    /// Called from renewal timers on the runtime, so implementations must not
    /// block.
    fn save(&self, config: &Configuration) -> impl Future<Output = Result<()>> + Send;
}

/// JSON file store, by default `$HOME/.tradingutility`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by `.tradingutility` in the user's home directory.
    pub fn in_home_dir() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| TdaError::Config("cannot locate home directory".into()))?;
        Ok(Self::new(Path::new(&home).join(CONFIG_FILE_NAME)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Configuration> {
        let bytes = std::fs::read(&self.path)?;
        let record: ConfigRecord = serde_json::from_slice(&bytes)?;
        let config = Configuration::from_record(record)?;
        tracing::info!(path = %self.path.display(), "configuration loaded from disk");
        Ok(config)
    }

    async fn save(&self, config: &Configuration) -> Result<()> {
        let json = serde_json::to_vec_pretty(&config.to_record())?;
        tokio::fs::write(&self.path, json).await?;
        tracing::info!(path = %self.path.display(), "configuration saved to disk");
        Ok(())
    }
}

/// In-process store. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<MemoryRecord>>,
}

#[derive(Debug, Default)]
struct MemoryRecord {
    config: Configuration,
    saves: usize,
}

impl MemoryConfigStore {
    /// Store seeded with `config`.
    pub fn new(config: Configuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryRecord { config, saves: 0 })),
        }
    }

    /// The currently stored record.
    pub fn current(&self) -> Configuration {
        self.lock().config.clone()
    }

    /// Number of times [`ConfigStore::save`] has been called.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRecord> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Configuration> {
        Ok(self.current())
    }

    async fn save(&self, config: &Configuration) -> Result<()> {
        let mut record = self.lock();
        record.config = config.clone();
        record.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_authorization_code_with_reserved_characters() {
        let config = Configuration::new("KEY@AMER.OAUTHAP", "https://127.0.0.1", "a+b/c=d e")
            .with_refresh_token("R1", Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());

        let record = config.to_record();
        assert_eq!(
            record.authorization_code_content,
            "https://127.0.0.1/?code=a%2Bb%2Fc%3Dd+e"
        );

        let back = Configuration::from_record(record).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn record_without_refresh_token_omits_fields() {
        let config = Configuration::new("id", "https://localhost", "code");
        let json = serde_json::to_value(config.to_record()).unwrap();
        assert!(json.get("refreshToken").is_none());
        assert!(json.get("refreshTokenExpiry").is_none());
    }

    #[test]
    fn mismatched_code_prefix_is_rejected() {
        let record = ConfigRecord {
            client_id: "id".into(),
            redirect_uri: "https://localhost".into(),
            authorization_code_content: "https://elsewhere/?code=x".into(),
            refresh_token: None,
            refresh_token_expiry: None,
        };
        assert!(matches!(
            Configuration::from_record(record),
            Err(TdaError::Config(_))
        ));
    }

    #[test]
    fn remaining_lifetime() {
        let now = Utc.timestamp_opt(1_000_000, 0).unwrap();
        let base = Configuration::new("id", "https://localhost", "code");

        assert_eq!(base.refresh_token_remaining(now), None);

        let expired = base
            .clone()
            .with_refresh_token("R", now - chrono::Duration::seconds(10));
        assert_eq!(expired.refresh_token_remaining(now), None);

        let live = base.with_refresh_token("R", now + chrono::Duration::seconds(90));
        assert_eq!(
            live.refresh_token_remaining(now),
            Some(Duration::from_secs(90))
        );
    }
}
