//! Streaming wire messages.
//!
//! Outbound frames are single JSON objects:
//!
//! ```json
//! {"service":"ADMIN","command":"LOGIN","requestid":"0","account":"123","source":"APP",
//!  "parameters":{"credential":"userid%3D...","token":"...","version":"1.0"}}
//! ```
//!
//! Inbound frames carry either a `response` array (answers correlated by
//! `requestid`), a `data` array (pushes on a named service channel), or
//! something else such as `notify` heartbeats, which are ignored.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::constants::streaming::{
    ACCT_ACTIVITY_FIELDS, CODE_SUCCESS, COMMAND_LOGIN, COMMAND_LOGOUT, COMMAND_SUBS,
    PROTOCOL_VERSION, SERVICE_ACCT_ACTIVITY, SERVICE_ADMIN,
};
use crate::error::{Result, TdaError};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRequest {
    /// Target service.
    pub service: String,
    /// Command for the service.
    pub command: String,
    /// Correlation id, unique for the life of the client.
    pub requestid: String,
    /// Account id from the streamer configuration.
    pub account: String,
    /// Application id from the streamer configuration.
    pub source: String,
    /// Command-specific parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// The caller-supplied part of a request: service, command and parameters.
///
/// The client fills in `requestid`, `account` and `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCommand {
    /// Target service.
    pub service: String,
    /// Command for the service.
    pub command: String,
    /// Command-specific parameters.
    pub parameters: Option<Value>,
}

impl StreamCommand {
    /// Command without parameters.
    pub fn new(service: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            command: command.into(),
            parameters: None,
        }
    }

    /// Attach parameters.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// `ADMIN` / `LOGIN` with the streaming credential and token.
    pub fn login(credential: &str, token: &str) -> Self {
        Self::new(SERVICE_ADMIN, COMMAND_LOGIN).with_parameters(json!({
            "credential": credential,
            "token": token,
            "version": PROTOCOL_VERSION,
        }))
    }

    /// `ADMIN` / `LOGOUT`.
    pub fn logout() -> Self {
        Self::new(SERVICE_ADMIN, COMMAND_LOGOUT)
    }

    /// `SUBS` on `service` for the given keys and fields.
    pub fn subscribe(service: &str, keys: &str, fields: &str) -> Self {
        Self::new(service, COMMAND_SUBS).with_parameters(json!({
            "keys": keys,
            "fields": fields,
        }))
    }

    /// `ACCT_ACTIVITY` / `SUBS` with the account activity fields.
    pub fn subscribe_account_activity(subscription_key: &str) -> Self {
        Self::subscribe(SERVICE_ACCT_ACTIVITY, subscription_key, ACCT_ACTIVITY_FIELDS)
    }

    pub(crate) fn into_request(self, requestid: String, account: &str, source: &str) -> StreamRequest {
        StreamRequest {
            service: self.service,
            command: self.command,
            requestid,
            account: account.to_owned(),
            source: source.to_owned(),
            parameters: self.parameters,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    response: Option<Vec<StreamResponse>>,
    #[serde(default)]
    data: Option<Vec<StreamData>>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// First element of a `response` array.
    Response(StreamResponse),
    /// First element of a `data` array.
    Data(StreamData),
    /// Anything else (heartbeats, empty arrays).
    Other,
}

/// Parse and classify one inbound text frame.
pub fn parse_frame(text: &str) -> Result<Inbound> {
    let frame: RawFrame = serde_json::from_str(text)?;
    if let Some(responses) = frame.response {
        return Ok(responses
            .into_iter()
            .next()
            .map_or(Inbound::Other, Inbound::Response));
    }
    if let Some(data) = frame.data {
        return Ok(data.into_iter().next().map_or(Inbound::Other, Inbound::Data));
    }
    Ok(Inbound::Other)
}

/// An answer to a request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamResponse {
    /// Service that answered.
    pub service: String,
    /// Correlation id of the request.
    #[serde(deserialize_with = "string_or_number")]
    pub requestid: String,
    /// Command being answered.
    #[serde(default)]
    pub command: Option<String>,
    /// Server timestamp (epoch millis).
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Result code and message.
    #[serde(default)]
    pub content: ResponseContent,
}

/// Body of a [`StreamResponse`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseContent {
    /// `0` on success.
    #[serde(default)]
    pub code: Option<i64>,
    /// Server message, present on failure.
    #[serde(default)]
    pub msg: Option<String>,
}

impl StreamResponse {
    /// Whether the response carries the success code.
    pub fn is_success(&self) -> bool {
        self.content.code == Some(CODE_SUCCESS)
    }

    /// `Ok(self)` on code 0, otherwise a [`TdaError::Protocol`] with the
    /// server message. Every non-zero code is treated the same way.
    pub fn into_result(self) -> Result<Self> {
        match self.content.code {
            Some(CODE_SUCCESS) => Ok(self),
            Some(code) => Err(TdaError::Protocol {
                code,
                message: self.content.msg.unwrap_or_default(),
            }),
            None => Err(TdaError::MissingField("content.code")),
        }
    }
}

/// A push on a data channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamData {
    /// Channel name.
    pub service: String,
    /// Server timestamp (epoch millis).
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Usually `"SUBS"`.
    #[serde(default)]
    pub command: Option<String>,
    /// Rows keyed by stringified field index; either an array of objects or a
    /// single object.
    #[serde(default)]
    pub content: Value,
}

impl StreamData {
    /// The content rows as objects.
    pub fn rows(&self) -> Vec<&Map<String, Value>> {
        match &self.content {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(row) => vec![row],
            _ => Vec::new(),
        }
    }

    /// Content rows parsed as account activity.
    pub fn account_activity(&self) -> Vec<AccountActivity> {
        self.rows().into_iter().map(AccountActivity::from_row).collect()
    }

    /// Whether any row announces that the subscription is live.
    pub(crate) fn announces_subscribed(&self) -> bool {
        self.account_activity().iter().any(AccountActivity::is_subscribed)
    }
}

/// One row of the `ACCT_ACTIVITY` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountActivity {
    /// Subscription key the row was published for (`key`).
    pub subscription_key: Option<String>,
    /// Account id (field `1`).
    pub account_id: String,
    /// Message type (field `2`), e.g. `SUBSCRIBED`, `OrderEntryRequest`.
    pub message_type: String,
    /// Message body (field `3`), usually XML.
    pub message_data: String,
}

impl AccountActivity {
    fn from_row(row: &Map<String, Value>) -> Self {
        let field = |name: &str| {
            row.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        Self {
            subscription_key: row.get("key").and_then(Value::as_str).map(str::to_owned),
            account_id: field("1"),
            message_type: field("2"),
            message_data: field("3"),
        }
    }

    /// Whether this row is the subscription acknowledgment.
    pub fn is_subscribed(&self) -> bool {
        self.message_type == crate::constants::streaming::MESSAGE_TYPE_SUBSCRIBED
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_shape() {
        let req = StreamCommand::login("userid%3Dabc", "tok").into_request("0".into(), "123", "APP");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({
                "service": "ADMIN",
                "command": "LOGIN",
                "requestid": "0",
                "account": "123",
                "source": "APP",
                "parameters": {"credential": "userid%3Dabc", "token": "tok", "version": "1.0"}
            })
        );
    }

    #[test]
    fn logout_request_has_no_parameters() {
        let req = StreamCommand::logout().into_request("7".into(), "123", "APP");
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("parameters").is_none());
        assert_eq!(json["command"], "LOGOUT");
    }

    #[test]
    fn classifies_response_frames() {
        let frame = r#"{"response":[{"service":"ADMIN","requestid":"0","command":"LOGIN","timestamp":1,"content":{"code":0,"msg":"ok"}}]}"#;
        let Inbound::Response(resp) = parse_frame(frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.requestid, "0");
        assert!(resp.is_success());
    }

    #[test]
    fn numeric_request_ids_are_accepted() {
        let frame = r#"{"response":[{"service":"ADMIN","requestid":4,"content":{"code":0}}]}"#;
        let Inbound::Response(resp) = parse_frame(frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.requestid, "4");
    }

    #[test]
    fn non_zero_code_is_a_protocol_fault() {
        let frame = r#"{"response":[{"service":"ADMIN","requestid":"0","content":{"code":3,"msg":"Login denied"}}]}"#;
        let Inbound::Response(resp) = parse_frame(frame).unwrap() else {
            panic!("expected response");
        };
        match resp.into_result() {
            Err(TdaError::Protocol { code, message }) => {
                assert_eq!(code, 3);
                assert_eq!(message, "Login denied");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn data_content_accepts_array_or_object() {
        let array = r#"{"data":[{"service":"ACCT_ACTIVITY","timestamp":1,"command":"SUBS","content":[{"seq":0,"key":"K","1":"acct1","2":"SUBSCRIBED","3":""}]}]}"#;
        let object = r#"{"data":[{"service":"ACCT_ACTIVITY","content":{"1":"acct1","2":"SUBSCRIBED","3":""}}]}"#;

        for frame in [array, object] {
            let Inbound::Data(data) = parse_frame(frame).unwrap() else {
                panic!("expected data");
            };
            let rows = data.account_activity();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].account_id, "acct1");
            assert!(data.announces_subscribed());
        }
    }

    #[test]
    fn heartbeats_are_other() {
        let frame = r#"{"notify":[{"heartbeat":"1591718400000"}]}"#;
        assert_eq!(parse_frame(frame).unwrap(), Inbound::Other);
        assert!(parse_frame("not json").is_err());
    }
}
