//! Streaming session client.
//!
//! Opens one WebSocket to the streaming server, logs in, subscribes to the
//! account activity channel and then demultiplexes inbound frames:
//!
//! - `response` frames go to the one-shot handler registered under their
//!   `requestid`;
//! - `data` frames go to the persistent handler registered for their
//!   `service` channel.
//!
//! # State machine
//!
//! ```text
//!   Disconnected ──start()──► Connecting ──► LoggingIn ──► Subscribing ──► Active
//!        ▲                                                                   │
//!        │                        stop(), input side open                    │
//!        ├──────────────── LoggingOut ◄──────────────────────────────────────┤
//!        │                        stop(), input side closed                  │
//!        └──────────────── AbortedDisconnect ◄───────────────────────────────┘
//! ```
//!
//! The session handle is published only once the subscription is
//! acknowledged; until then `send` and `request` fail with
//! [`TdaError::NotConnected`].
//!
//! # Example
//!
//! ```no_run
//! use tda_rs::client::TdaClient;
//! use tda_rs::token::AccessTokenSource;
//! use tda_rs::ws::streamer::StreamerClient;
//!
//! # #[tokio::main]
//! # async fn main() -> tda_rs::error::Result<()> {
//! let client = TdaClient::new().with_token_source(AccessTokenSource::fixed("token"));
//! let streamer = StreamerClient::new(client.get_streamer_config().await?);
//!
//! streamer.on_account_activity(|activity| {
//!     println!("{}: {}", activity.message_type, activity.message_data);
//! });
//! streamer.start().await?;
//! // ...
//! streamer.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::constants::streaming::{SERVICE_ACCT_ACTIVITY, SOCKET_PATH};
use crate::constants::{
    DEFAULT_LOGOUT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_STREAM_START_TIMEOUT,
};
use crate::error::{Result, TdaError};
use crate::scheduler::AbortOnDrop;
use crate::types::user_principals::StreamerConfig;
use crate::ws::messages::{
    AccountActivity, Inbound, StreamCommand, StreamData, StreamRequest, StreamResponse,
    parse_frame,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = SplitSink<WsStream, Message>;
type ReaderHalf = SplitStream<WsStream>;

/// One-shot handler for the response to a request.
pub type ResponseHandler = Box<dyn FnOnce(StreamResponse) + Send + Sync + 'static>;

/// Persistent handler for pushes on a data channel.
pub type ChannelHandler = Arc<dyn Fn(&StreamData) + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// State & settings
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`StreamerClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    /// No connection.
    Disconnected,
    /// Transport connect in progress.
    Connecting,
    /// Login request sent, waiting for its response.
    LoggingIn,
    /// Login accepted, waiting for the subscription acknowledgment.
    Subscribing,
    /// Subscription acknowledged; requests may be sent.
    Active,
    /// `stop()` negotiating a logout.
    LoggingOut,
    /// `stop()` dropping a connection whose input side already closed.
    AbortedDisconnect,
}

/// Timeouts for a [`StreamerClient`].
#[derive(Debug, Clone)]
pub struct StreamerSettings {
    /// Bound on `start()` reaching [`StreamerState::Active`].
    pub start_timeout: Duration,
    /// Bound on waiting for the logout acknowledgment.
    pub logout_timeout: Duration,
    /// Bound on [`StreamerClient::request`].
    pub request_timeout: Duration,
    /// Time the reader task gets to observe the close before it is aborted.
    pub shutdown_timeout: Duration,
}

impl Default for StreamerSettings {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_STREAM_START_TIMEOUT,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl StreamerSettings {
    /// Set the start bound. Default: 5 s.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the logout bound. Default: 5 s.
    pub fn logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Set the request bound. Default: 10 s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the shutdown bound. Default: 5 s.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for one streaming session at a time.
///
/// Handlers run on the reader task and must not block.
pub struct StreamerClient {
    shared: Arc<Shared>,
    settings: StreamerSettings,
    session: Mutex<Option<Session>>,
    lifecycle: AsyncMutex<()>,
}

/// State that outlives a single connection.
struct Shared {
    config: StreamerConfig,
    state: Mutex<StreamerState>,
    next_id: AtomicU64,
    channels: DashMap<String, ChannelHandler>,
}

/// One WebSocket connection and its correlation table.
struct Link {
    writer: AsyncMutex<Option<WriterHalf>>,
    pending: DashMap<String, ResponseHandler>,
    input_open: AtomicBool,
    output_open: AtomicBool,
    subscribed: Mutex<Option<oneshot::Sender<()>>>,
}

/// The published handle of an active session.
struct Session {
    link: Arc<Link>,
    reader: JoinHandle<()>,
}

impl StreamerClient {
    /// Create a disconnected client for `config`.
    pub fn new(config: StreamerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(StreamerState::Disconnected),
                next_id: AtomicU64::new(0),
                channels: DashMap::new(),
            }),
            settings: StreamerSettings::default(),
            session: Mutex::new(None),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Replace the default timeouts.
    pub fn with_settings(mut self, settings: StreamerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The configuration this client connects with.
    pub fn config(&self) -> &StreamerConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamerState {
        self.shared.state()
    }

    /// Whether requests can be sent.
    pub fn is_active(&self) -> bool {
        self.state() == StreamerState::Active
    }

    /// Connect, log in and subscribe to account activity.
    ///
    /// Returns once the subscription is acknowledged. A login response with a
    /// non-zero code fails with [`TdaError::Protocol`]; a connection closed
    /// mid-handshake fails with [`TdaError::ConnectionClosed`]; exceeding
    /// [`StreamerSettings::start_timeout`] fails with [`TdaError::Timeout`].
    /// A failed start leaves the client disconnected.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let state = self.state();
        if state != StreamerState::Disconnected {
            return Err(TdaError::InvalidState(format!(
                "streaming client cannot start while {state:?}"
            )));
        }

        let url = socket_url(&self.shared.config.socket_url)?;
        self.shared.set_state(StreamerState::Connecting);
        tracing::info!(%url, account_id = %self.shared.config.account_id, "connecting to streaming server");

        let mut attempt = Attempt {
            shared: &self.shared,
            link: None,
            reader: None,
            armed: true,
        };

        let outcome =
            tokio::time::timeout(self.settings.start_timeout, self.handshake(&url, &mut attempt))
                .await;

        match outcome {
            Ok(Ok(())) => {
                let (Some(link), Some(reader)) = (attempt.link.take(), attempt.reader.take()) else {
                    return Err(TdaError::InvalidState("handshake finished without a connection".into()));
                };
                attempt.armed = false;
                *self.lock_session() = Some(Session { link, reader });
                self.shared.set_state(StreamerState::Active);
                tracing::info!("streaming session active");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "streaming session failed to start");
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    timeout = ?self.settings.start_timeout,
                    state = ?self.state(),
                    "timed out starting streaming session"
                );
                Err(TdaError::Timeout("streaming session start"))
            }
        }
    }

    /// Log out and close the connection.
    ///
    /// Idempotent. With the input side still open, a logout is negotiated
    /// (bounded by [`StreamerSettings::logout_timeout`]) and a normal close is
    /// sent; otherwise the connection is dropped. Either way the client ends
    /// up [`StreamerState::Disconnected`] and unresolved handlers are dropped.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let Some(Session { link, reader }) = self.lock_session().take() else {
            tracing::debug!("streaming client already disconnected");
            return Ok(());
        };
        let _reset = ResetOnDrop(&self.shared);

        if link.input_open.load(Ordering::SeqCst) {
            self.shared.set_state(StreamerState::LoggingOut);
            self.logout(&link).await;

            if link.output_open.load(Ordering::SeqCst) {
                link.close().await;
            }

            let mut reader = AbortOnDrop(reader);
            if tokio::time::timeout(self.settings.shutdown_timeout, &mut reader.0)
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout = ?self.settings.shutdown_timeout,
                    "server did not close the connection in time, aborting"
                );
            }
        } else {
            self.shared.set_state(StreamerState::AbortedDisconnect);
            tracing::info!("connection already closed by server, dropping it");
            reader.abort();
        }

        link.pending.clear();
        link.writer.lock().await.take();
        tracing::info!("streaming session stopped");
        Ok(())
    }

    /// Send `command` and return its request id without waiting.
    ///
    /// `handler` runs at most once, with the correlated response. Fails with
    /// [`TdaError::NotConnected`] unless the session is active.
    pub async fn send<F>(&self, command: StreamCommand, handler: F) -> Result<String>
    where
        F: FnOnce(StreamResponse) + Send + Sync + 'static,
    {
        let link = self.active_link()?;
        self.exchange(&link, command, Box::new(handler)).await
    }

    /// Send `command` and wait for the correlated response.
    ///
    /// The response is returned whatever its code; use
    /// [`StreamResponse::into_result`] to treat non-zero codes as errors.
    pub async fn request(&self, command: StreamCommand) -> Result<StreamResponse> {
        let link = self.active_link()?;
        let (handler, rx) = oneshot_handler();
        let id = self.exchange(&link, command, handler).await?;

        match tokio::time::timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TdaError::ConnectionClosed),
            Err(_) => {
                link.pending.remove(&id);
                Err(TdaError::Timeout("stream response"))
            }
        }
    }

    /// Handle every subsequent push on `channel`, replacing any prior handler.
    pub fn on_channel_data<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(&StreamData) + Send + Sync + 'static,
    {
        self.shared.channels.insert(channel.into(), Arc::new(handler));
    }

    /// Remove the handler for `channel`. Returns whether one was registered.
    pub fn remove_channel_handler(&self, channel: &str) -> bool {
        self.shared.channels.remove(channel).is_some()
    }

    /// Handle parsed `ACCT_ACTIVITY` rows, including the `SUBSCRIBED`
    /// acknowledgment.
    pub fn on_account_activity<F>(&self, handler: F)
    where
        F: Fn(AccountActivity) + Send + Sync + 'static,
    {
        self.on_channel_data(SERVICE_ACCT_ACTIVITY, move |data: &StreamData| {
            for row in data.account_activity() {
                handler(row);
            }
        });
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn handshake(&self, url: &str, attempt: &mut Attempt<'_>) -> Result<()> {
        let config = &self.shared.config;

        let (ws, _resp) = connect_async(url).await?;
        let (write, read) = ws.split();

        let (latch_tx, mut latch_rx) = oneshot::channel();
        let link = Arc::new(Link {
            writer: AsyncMutex::new(Some(write)),
            pending: DashMap::new(),
            input_open: AtomicBool::new(true),
            output_open: AtomicBool::new(true),
            subscribed: Mutex::new(Some(latch_tx)),
        });
        attempt.link = Some(Arc::clone(&link));
        attempt.reader = Some(tokio::spawn(reader_loop(
            Arc::clone(&self.shared),
            Arc::clone(&link),
            read,
        )));

        // Login
        self.shared.set_state(StreamerState::LoggingIn);
        let (handler, login_rx) = oneshot_handler();
        self.exchange(&link, StreamCommand::login(&config.credential, &config.token), handler)
            .await?;
        let login = login_rx.await.map_err(|_| TdaError::ConnectionClosed)?;
        login.into_result()?;
        tracing::info!("streaming login accepted");

        // Subscribe
        self.shared.set_state(StreamerState::Subscribing);
        let (handler, subs_rx) = oneshot_handler();
        self.exchange(
            &link,
            StreamCommand::subscribe_account_activity(&config.subscription_key),
            handler,
        )
        .await?;

        // The acknowledgment push may arrive before or after the SUBS response.
        let subs_response = tokio::select! {
            latched = &mut latch_rx => {
                latched.map_err(|_| TdaError::ConnectionClosed)?;
                None
            }
            resp = subs_rx => Some(resp.map_err(|_| TdaError::ConnectionClosed)?),
        };
        if let Some(resp) = subs_response {
            resp.into_result()?;
            latch_rx.await.map_err(|_| TdaError::ConnectionClosed)?;
        }

        tracing::info!(channel = SERVICE_ACCT_ACTIVITY, "subscription acknowledged");
        Ok(())
    }

    /// Logout negotiation. Failures are logged, not returned.
    async fn logout(&self, link: &Link) {
        let (handler, rx) = oneshot_handler();
        if let Err(e) = self.exchange(link, StreamCommand::logout(), handler).await {
            tracing::warn!(error = %e, "failed to send logout request");
            return;
        }

        match tokio::time::timeout(self.settings.logout_timeout, rx).await {
            Ok(Ok(resp)) => match resp.into_result() {
                Ok(_) => tracing::info!("streaming logout acknowledged"),
                Err(e) => tracing::warn!(error = %e, "streaming logout rejected"),
            },
            Ok(Err(_)) => tracing::debug!("connection closed before logout acknowledgment"),
            Err(_) => tracing::warn!(
                timeout = ?self.settings.logout_timeout,
                "timed out waiting for logout acknowledgment"
            ),
        }
    }

    /// Register `handler` under a fresh request id, then transmit.
    async fn exchange(
        &self,
        link: &Link,
        command: StreamCommand,
        handler: ResponseHandler,
    ) -> Result<String> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        link.pending.insert(id.clone(), handler);

        if !link.input_open.load(Ordering::SeqCst) {
            link.pending.remove(&id);
            return Err(TdaError::ConnectionClosed);
        }

        let config = &self.shared.config;
        let request = command.into_request(id.clone(), &config.account_id, &config.app_id);
        tracing::debug!(
            requestid = %id,
            service = %request.service,
            command = %request.command,
            "sending stream request"
        );

        if let Err(e) = link.transmit(&request).await {
            link.pending.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn active_link(&self) -> Result<Arc<Link>> {
        if !self.is_active() {
            return Err(TdaError::NotConnected);
        }
        self.lock_session()
            .as_ref()
            .map(|s| Arc::clone(&s.link))
            .ok_or(TdaError::NotConnected)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for StreamerClient {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.reader.abort();
        }
    }
}

impl Shared {
    fn state(&self) -> StreamerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: StreamerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "streaming state change");
            *state = next;
        }
    }

    fn channel_handler(&self, channel: &str) -> Option<ChannelHandler> {
        self.channels.get(channel).map(|h| Arc::clone(h.value()))
    }
}

impl Link {
    async fn transmit(&self, request: &StreamRequest) -> Result<()> {
        let json = serde_json::to_string(request)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TdaError::NotConnected)?;
        if let Err(e) = writer.send(Message::Text(json.into())).await {
            self.output_open.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: Utf8Bytes::from_static("client shutting down"),
            };
            if let Err(e) = writer.send(Message::Close(Some(frame))).await {
                tracing::debug!(error = %e, "failed to send close frame");
            }
        }
        self.output_open.store(false, Ordering::SeqCst);
    }

    fn release_subscription_latch(&self) {
        let latch = self.subscribed.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = latch {
            let _ = tx.send(());
        }
    }
}

/// Tears down a handshake that did not complete.
struct Attempt<'a> {
    shared: &'a Shared,
    link: Option<Arc<Link>>,
    reader: Option<JoinHandle<()>>,
    armed: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(link) = self.link.take() {
            link.pending.clear();
        }
        self.shared.set_state(StreamerState::Disconnected);
    }
}

struct ResetOnDrop<'a>(&'a Shared);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(StreamerState::Disconnected);
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

async fn reader_loop(shared: Arc<Shared>, link: Arc<Link>, mut read: ReaderHalf) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatch(&shared, &link, text.as_str()),
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "streaming connection closed by server");
                link.output_open.store(false, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "streaming connection error");
                break;
            }
        }
    }

    link.input_open.store(false, Ordering::SeqCst);
    link.pending.clear();
    link.subscribed.lock().unwrap_or_else(|e| e.into_inner()).take();
    tracing::debug!("streaming reader finished");
}

fn dispatch(shared: &Shared, link: &Link, text: &str) {
    match parse_frame(text) {
        Ok(Inbound::Response(resp)) => match link.pending.remove(&resp.requestid) {
            Some((_, handler)) => handler(resp),
            None => tracing::debug!(requestid = %resp.requestid, "response for unknown request id"),
        },
        Ok(Inbound::Data(data)) => {
            if data.service == SERVICE_ACCT_ACTIVITY && data.announces_subscribed() {
                link.release_subscription_latch();
            }
            match shared.channel_handler(&data.service) {
                Some(handler) => handler(&data),
                None => tracing::debug!(channel = %data.service, "no handler for channel, dropping push"),
            }
        }
        Ok(Inbound::Other) => tracing::trace!("ignoring frame"),
        Err(e) => tracing::warn!(error = %e, "dropping unparseable frame"),
    }
}

fn oneshot_handler() -> (ResponseHandler, oneshot::Receiver<StreamResponse>) {
    let (tx, rx) = oneshot::channel();
    let handler: ResponseHandler = Box::new(move |resp| {
        let _ = tx.send(resp);
    });
    (handler, rx)
}

/// `wss://{host}/ws`, or the given URL plus `/ws` when it already has a scheme.
pub fn socket_url(raw: &str) -> Result<String> {
    let raw = raw.trim().trim_end_matches('/');
    let base = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("wss://{raw}")
    };
    let host = url::Url::parse(&base)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .filter(|host| !host.is_empty());
    if host.is_none() {
        return Err(TdaError::InvalidArgument(format!(
            "streamer socket address has no host: {raw:?}"
        )));
    }
    let url = url::Url::parse(&format!("{base}{SOCKET_PATH}"))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_forms() {
        assert_eq!(
            socket_url("streamer-ws.tdameritrade.com").unwrap(),
            "wss://streamer-ws.tdameritrade.com/ws"
        );
        assert_eq!(socket_url("ws://127.0.0.1:9001").unwrap(), "ws://127.0.0.1:9001/ws");
        assert!(matches!(socket_url(""), Err(TdaError::InvalidArgument(_))));
        assert!(matches!(socket_url("/"), Err(TdaError::InvalidArgument(_))));
        assert!(matches!(socket_url("wss://"), Err(TdaError::InvalidArgument(_))));
    }

    #[test]
    fn settings_setters() {
        let s = StreamerSettings::default()
            .start_timeout(Duration::from_millis(100))
            .request_timeout(Duration::from_secs(1));
        assert_eq!(s.start_timeout, Duration::from_millis(100));
        assert_eq!(s.request_timeout, Duration::from_secs(1));
        assert_eq!(s.logout_timeout, DEFAULT_LOGOUT_TIMEOUT);
    }

    #[tokio::test]
    async fn send_requires_an_active_session() {
        let client = StreamerClient::new(StreamerConfig {
            socket_url: "ws://127.0.0.1:1".into(),
            app_id: "APP".into(),
            token: "t".into(),
            account_id: "1".into(),
            credential: "c".into(),
            subscription_key: "k".into(),
        });
        assert_eq!(client.state(), StreamerState::Disconnected);
        assert!(matches!(
            client.request(StreamCommand::logout()).await,
            Err(TdaError::NotConnected)
        ));
        client.stop().await.unwrap();
    }
}
