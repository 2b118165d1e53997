//! Core HTTP client for the TD Ameritrade REST API.
//!
//! The [`TdaClient`] struct is the gateway for every REST call this crate
//! makes: the OAuth2 token endpoint, the user-principals lookup that feeds the
//! streaming client, and the account / order helpers. It wraps
//! [`reqwest::Client`] and provides typed `get`, `post`, `put`, and `delete`
//! methods.
//!
//! Authorized calls read the bearer token from an [`AccessTokenSource`] at
//! request time, so a client built once keeps working across token renewals.
//!
//! API endpoint methods are added to `TdaClient` via `impl` blocks in the
//! [`crate::api`] module.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::constants::API_BASE_URL;
use crate::error::{ApiErrorBody, Result, TdaError};
use crate::token::AccessTokenSource;

/// Core HTTP client for the TD Ameritrade REST API.
///
/// # Example
///
/// ```no_run
/// use tda_rs::client::TdaClient;
/// use tda_rs::token::AccessTokenSource;
///
/// # #[tokio::main]
/// # async fn main() -> tda_rs::error::Result<()> {
/// let client = TdaClient::new().with_token_source(AccessTokenSource::fixed("token"));
/// let balances = client.get_available_cash_balances().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TdaClient {
    http: reqwest::Client,
    /// Base URL for REST API requests (defaults to [`API_BASE_URL`]).
    base_url: String,
    /// Source of the bearer token for authorized calls.
    tokens: Option<AccessTokenSource>,
}

impl Default for TdaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TdaClient {
    /// Create a client against the production API with no token source.
    ///
    /// Such a client can only reach unauthenticated endpoints (the token
    /// endpoint) until [`with_token_source`](Self::with_token_source) is used.
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Create a client pointing at a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            tokens: None,
        }
    }

    /// Attach the accessor used to authorize requests.
    pub fn with_token_source(mut self, tokens: AccessTokenSource) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Returns a reference to the underlying `reqwest::Client`.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the attached token source, if any.
    pub fn token_source(&self) -> Option<&AccessTokenSource> {
        self.tokens.as_ref()
    }

    // -----------------------------------------------------------------------
    // Generic HTTP helpers
    // -----------------------------------------------------------------------

    /// Perform an authorized GET request and deserialize the JSON response.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.get_with_query::<R, [(&str, &str); 0]>(path, &[]).await
    }

    /// Perform an authorized GET request with query parameters.
    pub async fn get_with_query<R, Q>(&self, path: &str, query: &Q) -> Result<R>
    where
        R: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let resp = self
            .http
            .get(&url)
            .headers(self.auth_headers()?)
            .query(query)
            .send()
            .await?;

        self.handle_response(resp).await
    }

    /// Perform an authorized POST request with a JSON body and deserialize
    /// the response.
    pub async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await?;

        self.handle_response(resp).await
    }

    /// Perform an authorized POST request that answers with a `Location`
    /// header instead of a body, returning the header's last path segment.
    pub async fn post_for_location<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let url = self.url(path);
        tracing::debug!(%url, "POST (location)");

        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.parse_error_body(status, &body));
        }

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(TdaError::MissingField("Location"))?;

        location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or(TdaError::MissingField("Location"))
    }

    /// Perform an authorized PUT request with a JSON body, expecting no
    /// response body.
    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, "PUT");

        let resp = self
            .http
            .put(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await?;

        self.handle_empty_response(resp).await
    }

    /// Perform an authorized DELETE request that returns no body.
    pub async fn delete_no_content(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, "DELETE (no content)");

        let resp = self
            .http
            .delete(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        self.handle_empty_response(resp).await
    }

    /// Perform an unauthenticated form-encoded POST and deserialize the JSON
    /// response. Used for the OAuth2 token endpoint.
    pub async fn post_form<F, R>(&self, path: &str, form: &F) -> Result<R>
    where
        F: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST (form)");

        let resp = self.http.post(&url).form(form).send().await?;

        self.handle_response(resp).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Build the full URL from a path segment.
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Default headers applied to every request.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Per-request bearer header, built from the token current at call time.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            TdaError::InvalidArgument("no access token source configured".into())
        })?;

        let value = HeaderValue::from_str(&format!("Bearer {}", tokens.current())).map_err(|_| {
            TdaError::InvalidArgument("access token contains invalid header characters".into())
        })?;

        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// Read a response, returning either the deserialized body or a `TdaError`.
    async fn handle_response<R: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<R> {
        let status = resp.status();
        let bytes = resp.bytes().await.unwrap_or_default();

        if status.is_success() {
            serde_json::from_slice(&bytes).map_err(TdaError::Json)
        } else {
            let body = String::from_utf8_lossy(&bytes);
            Err(self.parse_error_body(status, &body))
        }
    }

    /// Read a response whose body is irrelevant on success.
    async fn handle_empty_response(&self, resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(self.parse_error_body(status, &body))
        }
    }

    /// Try to parse the API's JSON error structure; fall back to a raw HTTP
    /// status error.
    pub(crate) fn parse_error_body(&self, status: reqwest::StatusCode, body: &str) -> TdaError {
        if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
            if api_err.error.is_some() || api_err.error_description.is_some() {
                return TdaError::Api(api_err);
            }
        }
        TdaError::HttpStatus {
            status,
            body: body.to_owned(),
        }
    }
}
