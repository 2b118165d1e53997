//! User principals types and the streaming configuration derived from them.

use serde::{Deserialize, Serialize};

/// Response of `GET /v1/userprincipals`.
///
/// Only the parts needed to reach the streaming server are modelled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrincipals {
    /// Login id of the user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Primary account id.
    #[serde(default)]
    pub primary_account_id: Option<String>,
    /// Connection details for the streaming server.
    #[serde(default)]
    pub streamer_info: Option<StreamerInfo>,
    /// Subscription keys for streaming services.
    #[serde(default)]
    pub streamer_subscription_keys: Option<StreamerSubscriptionKeys>,
    /// Accounts the user can access.
    #[serde(default)]
    pub accounts: Vec<PrincipalAccount>,
}

/// Streaming server connection details.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamerInfo {
    /// Host name of the streaming server (no scheme, no path).
    pub streamer_socket_url: String,
    /// Streaming token.
    pub token: String,
    /// Issue time of the streaming token, e.g. `2020-05-22T02:12:48+0000`.
    pub token_timestamp: String,
    /// User group for the credential.
    pub user_group: String,
    /// Access level for the credential.
    pub access_level: String,
    /// Access control list for the credential.
    pub acl: String,
    /// Application id, sent as the `source` of every streaming request.
    pub app_id: String,
}

/// Container for streaming subscription keys.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamerSubscriptionKeys {
    /// Keys, one per account.
    #[serde(default)]
    pub keys: Vec<SubscriptionKey>,
}

/// A single subscription key.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionKey {
    /// The key value.
    pub key: String,
}

/// An account entry of the user principals.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalAccount {
    /// Account id.
    pub account_id: String,
    /// Company code used in the streaming credential.
    #[serde(default)]
    pub company: String,
    /// Segment used in the streaming credential.
    #[serde(default)]
    pub segment: String,
    /// CD domain id used in the streaming credential.
    #[serde(default)]
    pub account_cd_domain_id: String,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Everything the streaming client needs to connect, log in and subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Server-supplied socket host (or a full `ws://` / `wss://` URL).
    pub socket_url: String,
    /// Application id, sent as `source`.
    pub app_id: String,
    /// Streaming token, sent in the login parameters.
    pub token: String,
    /// Account id, sent as `account`.
    pub account_id: String,
    /// URL-encoded composite credential for the login request.
    pub credential: String,
    /// Subscription key for the account activity channel.
    pub subscription_key: String,
}
