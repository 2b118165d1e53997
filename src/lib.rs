//! # tda-rs
//!
//! A Rust session layer for the [TD Ameritrade API](https://developer.tdameritrade.com/apis):
//! unattended OAuth2 token renewal and the account activity streaming
//! protocol, plus the handful of REST calls they rely on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tda_rs::client::TdaClient;
//! use tda_rs::config::FileConfigStore;
//! use tda_rs::token::TokenManager;
//! use tda_rs::ws::streamer::StreamerClient;
//!
//! #[tokio::main]
//! async fn main() -> tda_rs::error::Result<()> {
//!     let manager = TokenManager::new(TdaClient::new(), FileConfigStore::in_home_dir()?)?;
//!     let tokens = manager.start().await?;
//!
//!     let client = TdaClient::new().with_token_source(tokens);
//!     let streamer = StreamerClient::new(client.get_streamer_config().await?);
//!     streamer.on_account_activity(|row| println!("{}", row.message_type));
//!     streamer.start().await?;
//!
//!     // ...
//!
//!     streamer.stop().await?;
//!     manager.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod scheduler;
pub mod token;
pub mod types;
pub mod ws;

/// Re-export the main client type at crate root for convenience.
pub use client::TdaClient;
/// Re-export the error type and Result alias.
pub use error::{Result, TdaError};
