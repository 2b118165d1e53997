//! Error types for the `tda-rs` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, TdaError>`.
//!
//! [`TdaError`] covers:
//! - **API errors**: OAuth2-style error bodies (`error`, `error_description`)
//! - **HTTP status errors**: Unexpected status codes with response body
//! - **HTTP transport errors**: Network, TLS, timeout failures
//! - **Streaming protocol faults**: Non-zero response codes during login,
//!   subscription or logout
//! - **Session state errors**: Sends on a session that is not active,
//!   connections closed mid-handshake, bounded waits that expired
//! - **Local errors**: Configuration file I/O and malformed records

use std::fmt;

/// Error response returned by the token endpoint and most REST endpoints.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiErrorBody {
    /// Short error identifier (e.g. `"invalid_grant"`).
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable description of the error.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => write!(f, "{error}: {description}"),
            (Some(error), None) => f.write_str(error),
            (None, Some(description)) => f.write_str(description),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

/// All possible errors produced by the `tda-rs` client.
#[derive(Debug, thiserror::Error)]
pub enum TdaError {
    /// An error body returned by the REST API or the token endpoint.
    #[error("API error: {0}")]
    Api(ApiErrorBody),

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Reading or writing the persisted configuration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The streaming server answered a request with a non-zero code.
    #[error("streaming protocol fault (code {code}): {message}")]
    Protocol {
        /// The server-supplied response code.
        code: i64,
        /// The server-supplied message, if any.
        message: String,
    },

    /// A bounded wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The streaming connection closed before the pending operation finished.
    #[error("streaming connection closed")]
    ConnectionClosed,

    /// A send was attempted without an active streaming session.
    #[error("streaming session is not active")]
    NotConnected,

    /// A required field was absent from a server response.
    #[error("missing field in response: {0}")]
    MissingField(&'static str),

    /// A server timestamp could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The persisted configuration is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation is not valid in the component's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TdaError>;
