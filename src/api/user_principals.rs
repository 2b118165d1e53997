//! User principals endpoint and the streaming credential built from it.

use chrono::DateTime;

use crate::client::TdaClient;
use crate::constants::USER_PRINCIPALS_PATH;
use crate::error::{Result, TdaError};
use crate::types::user_principals::*;

impl TdaClient {
    /// Retrieve the user principals with streaming connection info and
    /// subscription keys.
    ///
    /// **Endpoint:** `GET /v1/userprincipals?fields=streamerConnectionInfo,streamerSubscriptionKeys`
    pub async fn get_user_principals(&self) -> Result<UserPrincipals> {
        self.get_with_query(
            USER_PRINCIPALS_PATH,
            &[("fields", "streamerConnectionInfo,streamerSubscriptionKeys")],
        )
        .await
    }

    /// Everything the streaming client needs, for the first account and the
    /// first subscription key.
    pub async fn get_streamer_config(&self) -> Result<StreamerConfig> {
        let principals = self.get_user_principals().await?;
        let config = streamer_config(&principals)?;
        tracing::info!(
            account_id = %config.account_id,
            socket_url = %config.socket_url,
            "streamer configuration resolved"
        );
        Ok(config)
    }
}

/// Derive a [`StreamerConfig`] from a user principals response.
pub fn streamer_config(principals: &UserPrincipals) -> Result<StreamerConfig> {
    let info = principals
        .streamer_info
        .as_ref()
        .ok_or(TdaError::MissingField("streamerInfo"))?;
    let account = principals
        .accounts
        .first()
        .ok_or(TdaError::MissingField("accounts"))?;
    let subscription_key = principals
        .streamer_subscription_keys
        .as_ref()
        .and_then(|k| k.keys.first())
        .ok_or(TdaError::MissingField("streamerSubscriptionKeys.keys"))?;

    Ok(StreamerConfig {
        socket_url: info.streamer_socket_url.clone(),
        app_id: info.app_id.clone(),
        token: info.token.clone(),
        account_id: account.account_id.clone(),
        credential: credential(info, account)?,
        subscription_key: subscription_key.key.clone(),
    })
}

/// The `&`-joined, URL-encoded login credential.
fn credential(info: &StreamerInfo, account: &PrincipalAccount) -> Result<String> {
    let timestamp = token_timestamp_millis(&info.token_timestamp)?.to_string();

    let mut out = url::form_urlencoded::Serializer::new(String::new());
    out.append_pair("userid", &account.account_id)
        .append_pair("token", &info.token)
        .append_pair("company", &account.company)
        .append_pair("segment", &account.segment)
        .append_pair("cddomain", &account.account_cd_domain_id)
        .append_pair("usergroup", &info.user_group)
        .append_pair("accesslevel", &info.access_level)
        .append_pair("authorized", "Y")
        .append_pair("timestamp", &timestamp)
        .append_pair("appid", &info.app_id)
        .append_pair("acl", &info.acl);
    Ok(out.finish())
}

/// Parse `2020-05-22T02:12:48+0000` (fractional seconds allowed) to epoch
/// milliseconds.
fn token_timestamp_millis(raw: &str) -> Result<i64> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| t.timestamp_millis())
        .map_err(|_| TdaError::InvalidTimestamp(raw.to_owned()))
}
