//! Unattended OAuth2 token renewal.
//!
//! # Lifecycle
//!
//! ```text
//!   start() ──► persisted refresh token still valid?
//!                 │ yes                         │ no
//!                 ▼                             ▼
//!           refresh grant               authorization-code exchange
//!           schedule reinit at            schedule renewal at expires_in
//!           remaining lifetime            schedule reinit at refresh_token_expires_in
//!                 │                             persist refresh token
//!                 └──────────────┬──────────────┘
//!                                ▼
//!                     renewal timer ──► refresh grant ──► renewal timer ...
//!                     reinit timer  ──► authorization-code exchange ...
//! ```
//!
//! At most one renewal timer and one reinitialization timer exist at a time;
//! scheduling a new one replaces the old. A background failure keeps the last
//! good token, is logged at `error` and counted in
//! [`TokenManager::renewal_failures`]; nothing is retried until the next
//! scheduled step.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{ConfigStore, Configuration};
use crate::constants::{DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TOKEN_START_TIMEOUT};
use crate::error::{Result, TdaError};
use crate::scheduler::{self, TimerSlot};
use crate::token::AccessTokenSource;
use crate::types::auth::{TokenGrant, TokenResponse};

// ---------------------------------------------------------------------------
// Token endpoint seam
// ---------------------------------------------------------------------------

/// Submits grants to the OAuth2 token endpoint.
///
/// [`TdaClient`](crate::client::TdaClient) implements this against the real
/// endpoint.
pub trait TokenEndpoint: Send + Sync + 'static {
    /// Submit `grant` and return the parsed response. Non-success responses
    /// must be returned as errors.
    fn request_token(&self, grant: &TokenGrant) -> impl Future<Output = Result<TokenResponse>> + Send;
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Bounds and margins for a [`TokenManager`].
#[derive(Debug, Clone)]
pub struct TokenManagerSettings {
    /// Bound on obtaining the first token in [`TokenManager::start`].
    pub start_timeout: Duration,
    /// Time an in-flight renewal gets to finish during `stop()`.
    pub shutdown_timeout: Duration,
    /// How long before expiry timers fire. Zero fires exactly at `expires_in`.
    pub renewal_margin: Duration,
}

impl Default for TokenManagerSettings {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_TOKEN_START_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            renewal_margin: Duration::ZERO,
        }
    }
}

impl TokenManagerSettings {
    /// Set the start bound. Default: 30 s.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the shutdown bound. Default: 5 s.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the renewal margin. Default: zero.
    pub fn renewal_margin(mut self, margin: Duration) -> Self {
        self.renewal_margin = margin;
        self
    }
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Keeps an access token valid for as long as it runs.
///
/// `start()` and `stop()` are mutually exclusive; calling `start()` on a
/// running manager stops the previous run first.
pub struct TokenManager<E: TokenEndpoint, S: ConfigStore> {
    inner: Arc<Inner<E, S>>,
    lifecycle: AsyncMutex<()>,
}

struct Inner<E, S> {
    endpoint: E,
    store: S,
    settings: TokenManagerSettings,
    tokens: AccessTokenSource,
    state: Mutex<State>,
    renewal: TimerSlot,
    reinit: TimerSlot,
    renewal_failures: AtomicU64,
}

struct State {
    config: Configuration,
    running: bool,
    access_token_expiry: Option<DateTime<Utc>>,
}

impl<E: TokenEndpoint, S: ConfigStore> TokenManager<E, S> {
    /// Build a manager, loading the persisted configuration from `store`.
    pub fn new(endpoint: E, store: S) -> Result<Self> {
        let config = store.load()?;
        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                store,
                settings: TokenManagerSettings::default(),
                tokens: AccessTokenSource::empty(),
                state: Mutex::new(State {
                    config,
                    running: false,
                    access_token_expiry: None,
                }),
                renewal: TimerSlot::new("access_token_renewal"),
                reinit: TimerSlot::new("refresh_token_reinit"),
                renewal_failures: AtomicU64::new(0),
            }),
            lifecycle: AsyncMutex::new(()),
        })
    }

    /// Replace the default settings. Must be called before `start()`.
    pub fn with_settings(mut self, settings: TokenManagerSettings) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.settings = settings,
            None => tracing::warn!("token manager already shared, settings unchanged"),
        }
        self
    }

    /// Obtain the first access token and start background renewal.
    ///
    /// Returns once a token is available, or fails after
    /// [`TokenManagerSettings::start_timeout`]. A failed start leaves the
    /// manager stopped.
    pub async fn start(&self) -> Result<AccessTokenSource> {
        let _guard = self.lifecycle.lock().await;

        if self.inner.lock_state().running {
            tracing::info!("token manager already running, restarting");
            self.inner.shutdown().await?;
        }

        self.inner.renewal.open();
        self.inner.reinit.open();
        self.inner.lock_state().running = true;

        let outcome =
            tokio::time::timeout(self.inner.settings.start_timeout, self.inner.bootstrap()).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!("token manager started");
                Ok(self.inner.tokens.clone())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to obtain initial access token");
                self.inner.halt().await;
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    timeout = ?self.inner.settings.start_timeout,
                    "timed out obtaining initial access token"
                );
                self.inner.halt().await;
                Err(TdaError::Timeout("initial access token"))
            }
        }
    }

    /// Cancel background renewal and persist the refresh token.
    ///
    /// The accessor returned by [`start`](Self::start) keeps returning the
    /// last token. Only a failure to persist the configuration is returned.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.inner.shutdown().await
    }

    /// Accessor for the current token, valid whether or not the manager runs.
    pub fn token_source(&self) -> AccessTokenSource {
        self.inner.tokens.clone()
    }

    /// Whether background renewal is active.
    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    /// Snapshot of the configuration record as it would be persisted now.
    pub fn configuration(&self) -> Configuration {
        self.inner.lock_state().config.clone()
    }

    /// Expiry of the current access token, if one has been obtained.
    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().access_token_expiry
    }

    /// Number of background renewals or reinitializations that failed.
    pub fn renewal_failures(&self) -> u64 {
        self.inner.renewal_failures.load(Ordering::Relaxed)
    }
}

impl<E: TokenEndpoint, S: ConfigStore> Drop for TokenManager<E, S> {
    fn drop(&mut self) {
        self.inner.renewal.cancel_now();
        self.inner.reinit.cancel_now();
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

impl<E: TokenEndpoint, S: ConfigStore> Inner<E, S> {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First token of a run: refresh grant when the persisted refresh token
    /// is still valid, full exchange otherwise.
    async fn bootstrap(self: &Arc<Self>) -> Result<()> {
        let remaining = self.lock_state().config.refresh_token_remaining(Utc::now());

        match remaining {
            Some(remaining) => {
                tracing::info!(
                    remaining_secs = remaining.as_secs(),
                    "persisted refresh token still valid"
                );
                self.refresh().await?;
                self.schedule_reinitialize(remaining);
                Ok(())
            }
            None => {
                tracing::info!("no valid persisted refresh token, exchanging authorization code");
                self.initialize().await
            }
        }
    }

    /// Authorization-code exchange: new access and refresh tokens.
    async fn initialize(self: &Arc<Self>) -> Result<()> {
        let grant = {
            let state = self.lock_state();
            TokenGrant::authorization_code(
                &state.config.authorization_code,
                &state.config.client_id,
                &state.config.redirect_uri,
            )
        };

        let resp = self.endpoint.request_token(&grant).await?;
        let refresh_token = resp
            .refresh_token
            .clone()
            .ok_or(TdaError::MissingField("refresh_token"))?;
        let refresh_expires_in = resp
            .refresh_token_expires_in
            .ok_or(TdaError::MissingField("refresh_token_expires_in"))?;

        let now = Utc::now();
        let access_expiry = expiry_after(now, resp.expires_in, "expires_in")?;
        let refresh_expiry = expiry_after(now, refresh_expires_in, "refresh_token_expires_in")?;

        let snapshot = {
            let mut state = self.lock_state();
            if !state.running {
                tracing::warn!("token manager stopped during exchange, discarding tokens");
                return Ok(());
            }
            state.config.refresh_token = Some(refresh_token);
            state.config.refresh_token_expiry = Some(refresh_expiry);
            state.access_token_expiry = Some(access_expiry);
            self.tokens.publish(&resp.access_token);
            state.config.clone()
        };

        self.schedule_renewal(Duration::from_secs(resp.expires_in));
        self.schedule_reinitialize(Duration::from_secs(refresh_expires_in));

        tracing::info!(
            next_refresh = %access_expiry,
            next_reinit = %refresh_expiry,
            "access token initialized"
        );

        self.store.save(&snapshot).await
    }

    /// Refresh-token grant: new access token, same refresh token.
    async fn refresh(self: &Arc<Self>) -> Result<()> {
        let grant = {
            let state = self.lock_state();
            let refresh_token = state
                .config
                .refresh_token
                .as_deref()
                .ok_or_else(|| TdaError::InvalidState("no refresh token available".into()))?;
            TokenGrant::refresh_token(refresh_token, &state.config.client_id)
        };

        let resp = self.endpoint.request_token(&grant).await?;
        let access_expiry = expiry_after(Utc::now(), resp.expires_in, "expires_in")?;

        {
            let mut state = self.lock_state();
            if !state.running {
                tracing::warn!("token manager stopped during refresh, discarding token");
                return Ok(());
            }
            state.access_token_expiry = Some(access_expiry);
            self.tokens.publish(&resp.access_token);
        }

        self.schedule_renewal(Duration::from_secs(resp.expires_in));

        tracing::info!(next_refresh = %access_expiry, "access token refreshed");
        Ok(())
    }

    fn schedule_renewal(self: &Arc<Self>, expires_in: Duration) {
        let delay = expires_in.saturating_sub(self.settings.renewal_margin);
        let weak = Arc::downgrade(self);
        let handle = scheduler::schedule(delay, move || async move {
            let Some(inner) = weak.upgrade() else { return };
            if let Err(e) = inner.refresh().await {
                inner.record_failure("access token renewal", &e);
            }
        });
        self.renewal.replace(handle);
    }

    fn schedule_reinitialize(self: &Arc<Self>, lifetime: Duration) {
        let delay = lifetime.saturating_sub(self.settings.renewal_margin);
        let weak = Arc::downgrade(self);
        let handle = scheduler::schedule(delay, move || async move {
            let Some(inner) = weak.upgrade() else { return };
            if let Err(e) = inner.initialize().await {
                inner.record_failure("refresh token reinitialization", &e);
            }
        });
        self.reinit.replace(handle);
    }

    fn record_failure(&self, step: &'static str, error: &TdaError) {
        let failures = self.renewal_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let expiry = self.lock_state().access_token_expiry;
        tracing::error!(
            step,
            error = %error,
            failures,
            access_token_expiry = ?expiry,
            "background token step failed, keeping previous access token"
        );
    }

    /// Stop scheduling without persisting. Used after a failed start.
    async fn halt(&self) {
        self.lock_state().running = false;
        self.renewal.close(self.settings.shutdown_timeout).await;
        self.reinit.close(self.settings.shutdown_timeout).await;
    }

    /// Stop scheduling and persist the configuration.
    async fn shutdown(&self) -> Result<()> {
        self.halt().await;
        let snapshot = self.lock_state().config.clone();
        self.store.save(&snapshot).await?;
        tracing::info!("token manager stopped");
        Ok(())
    }
}

/// `now + secs`, rejecting lifetimes that do not fit a timestamp.
fn expiry_after(now: DateTime<Utc>, secs: u64, field: &str) -> Result<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| TdaError::InvalidArgument(format!("{field} out of range: {secs}")))
}
