//! Access-token lifecycle.
//!
//! [`TokenManager`] obtains an access token through the OAuth2 token endpoint
//! and keeps it fresh in the background for as long as it runs:
//!
//! - the **access token** is renewed with the refresh-token grant every time
//!   its `expires_in` elapses;
//! - the **refresh token** is replaced with a full authorization-code exchange
//!   every time its `refresh_token_expires_in` elapses, and persisted through a
//!   [`ConfigStore`](crate::config::ConfigStore) so a restarted process can
//!   skip the exchange while the stored refresh token is still valid.
//!
//! Callers read the token through an [`AccessTokenSource`], which never
//! blocks and never observes a partially written value.
//!
//! # Example
//!
//! ```no_run
//! use tda_rs::client::TdaClient;
//! use tda_rs::config::FileConfigStore;
//! use tda_rs::token::TokenManager;
//!
//! # #[tokio::main]
//! # async fn main() -> tda_rs::error::Result<()> {
//! let manager = TokenManager::new(TdaClient::new(), FileConfigStore::in_home_dir()?)?;
//! let tokens = manager.start().await?;
//!
//! let client = TdaClient::new().with_token_source(tokens);
//! let principals = client.get_user_principals().await?;
//!
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod source;

pub use manager::{TokenEndpoint, TokenManager, TokenManagerSettings};
pub use source::AccessTokenSource;
