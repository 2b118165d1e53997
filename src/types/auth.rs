//! OAuth2 token endpoint request and response types.

use serde::{Deserialize, Serialize};

/// A grant submitted to the token endpoint as a form-encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum TokenGrant {
    /// Full exchange of a browser authorization code for both token types.
    AuthorizationCode {
        /// Authorization code from the browser redirect.
        code: String,
        /// OAuth2 client id.
        client_id: String,
        /// Registered redirect URI.
        redirect_uri: String,
        /// Always `"offline"` so a refresh token is issued.
        access_type: String,
    },
    /// Renewal of the access token with an existing refresh token.
    RefreshToken {
        /// The current refresh token.
        refresh_token: String,
        /// OAuth2 client id.
        client_id: String,
    },
}

impl TokenGrant {
    /// Authorization-code grant requesting offline access.
    pub fn authorization_code(
        code: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self::AuthorizationCode {
            code: code.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            access_type: "offline".to_owned(),
        }
    }

    /// Refresh-token grant.
    pub fn refresh_token(refresh_token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::RefreshToken {
            refresh_token: refresh_token.into(),
            client_id: client_id.into(),
        }
    }

    /// The `grant_type` value sent on the wire.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Token endpoint response.
///
/// `refresh_token` and `refresh_token_expires_in` are only present for
/// authorization-code grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// The bearer token for REST calls.
    pub access_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
    /// Long-lived refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Refresh-token lifetime in seconds.
    #[serde(default)]
    pub refresh_token_expires_in: Option<u64>,
    /// Usually `"Bearer"`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_encode_as_forms() {
        let grant = TokenGrant::authorization_code("c/1", "id", "https://127.0.0.1");
        let form = serde_json::to_value(&grant).unwrap();
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["access_type"], "offline");
        assert_eq!(form["redirect_uri"], "https://127.0.0.1");

        let grant = TokenGrant::refresh_token("R1", "id");
        let form = serde_json::to_value(&grant).unwrap();
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "R1");
        assert!(form.get("code").is_none());
    }

    #[test]
    fn refresh_response_has_no_refresh_token() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"A2","expires_in":1800}"#).unwrap();
        assert_eq!(resp.access_token, "A2");
        assert_eq!(resp.refresh_token, None);
        assert_eq!(resp.refresh_token_expires_in, None);
    }
}
