//! OAuth2 token endpoint.

use crate::client::TdaClient;
use crate::constants::TOKEN_PATH;
use crate::error::Result;
use crate::token::TokenEndpoint;
use crate::types::auth::{TokenGrant, TokenResponse};

impl TdaClient {
    /// Submit a grant to the token endpoint.
    ///
    /// Unauthenticated; the grant is sent as a form-encoded body.
    ///
    /// **Endpoint:** `POST /v1/oauth2/token`
    pub async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse> {
        tracing::debug!(grant_type = grant.grant_type(), "requesting token");
        self.post_form(TOKEN_PATH, grant).await
    }
}

impl TokenEndpoint for TdaClient {
    fn request_token(&self, grant: &TokenGrant) -> impl Future<Output = Result<TokenResponse>> + Send {
        TdaClient::request_token(self, grant)
    }
}
