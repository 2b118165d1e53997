//! Request and response types for the TD Ameritrade REST API.
//!
//! - [`auth`]: OAuth2 grants and token responses
//! - [`user_principals`]: User principals and the derived [`StreamerConfig`](user_principals::StreamerConfig)
//! - [`accounts`]: Accounts, balances, positions
//! - [`orders`]: Order placement bodies

pub mod accounts;
pub mod auth;
pub mod orders;
pub mod user_principals;
