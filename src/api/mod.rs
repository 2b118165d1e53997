//! REST API endpoint implementations.
//!
//! Each sub-module adds high-level `async` methods to
//! [`TdaClient`](crate::client::TdaClient) via `impl` blocks.
//!
//! ## Modules
//!
//! | Module | Endpoints | Description |
//! |---|---|---|
//! | [`auth`] | 1 | OAuth2 token endpoint ([`TokenEndpoint`](crate::token::TokenEndpoint)) |
//! | [`user_principals`] | 1 | Streaming connection info and credential |
//! | [`accounts`] | 1 | Accounts, positions, cash balances |
//! | [`orders`] | 3 | Place, replace, cancel |

pub mod accounts;
pub mod auth;
pub mod orders;
pub mod user_principals;
