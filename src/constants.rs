//! Constants for the TD Ameritrade API.
//!
//! Contains base URLs, endpoint paths, streaming protocol identifiers and the
//! default bounds used by the session components. These are used internally
//! by [`TdaClient`](crate::client::TdaClient), the token manager and the
//! streaming client, but are also exported for advanced usage.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Base URLs & paths
// ---------------------------------------------------------------------------

/// Base URL for the TD Ameritrade REST API.
pub const API_BASE_URL: &str = "https://api.tdameritrade.com";

/// OAuth2 token endpoint path.
pub const TOKEN_PATH: &str = "/v1/oauth2/token";

/// User principals endpoint path.
pub const USER_PRINCIPALS_PATH: &str = "/v1/userprincipals";

/// Accounts endpoint path.
pub const ACCOUNTS_PATH: &str = "/v1/accounts";

// ---------------------------------------------------------------------------
// Persisted configuration
// ---------------------------------------------------------------------------

/// File name of the persisted configuration, relative to the home directory.
pub const CONFIG_FILE_NAME: &str = ".tradingutility";

// ---------------------------------------------------------------------------
// Streaming protocol
// ---------------------------------------------------------------------------

/// Streaming protocol identifiers.
pub mod streaming {
    /// Administrative service carrying LOGIN / LOGOUT.
    pub const SERVICE_ADMIN: &str = "ADMIN";
    /// Account activity data channel.
    pub const SERVICE_ACCT_ACTIVITY: &str = "ACCT_ACTIVITY";

    /// Login command.
    pub const COMMAND_LOGIN: &str = "LOGIN";
    /// Logout command.
    pub const COMMAND_LOGOUT: &str = "LOGOUT";
    /// Subscribe command.
    pub const COMMAND_SUBS: &str = "SUBS";

    /// Protocol version sent with the login request.
    pub const PROTOCOL_VERSION: &str = "1.0";

    /// Fields requested for the account activity channel.
    pub const ACCT_ACTIVITY_FIELDS: &str = "1,2,3";

    /// Response code signalling success.
    pub const CODE_SUCCESS: i64 = 0;

    /// Message type announcing that a subscription is live.
    pub const MESSAGE_TYPE_SUBSCRIBED: &str = "SUBSCRIBED";

    /// Path appended to the server-supplied socket URL.
    pub const SOCKET_PATH: &str = "/ws";
}

// ---------------------------------------------------------------------------
// Default bounds
// ---------------------------------------------------------------------------

/// Default bound on obtaining the first access token.
pub const DEFAULT_TOKEN_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the streaming handshake reaching the active state.
pub const DEFAULT_STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on waiting for the logout acknowledgment.
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on waiting for a correlated streaming response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on graceful shutdown of background tasks before they are
/// aborted.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
