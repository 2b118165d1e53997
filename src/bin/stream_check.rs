//! Binary that starts unattended token renewal, opens the account activity
//! stream and prints every activity row for a fixed window.
//!
//! # Usage
//!
//! ```sh
//! export TDA_CONFIG_PATH="$HOME/.tradingutility"   # optional
//! export TDA_LISTEN_SECS=60                          # optional, default 30
//! cargo run --bin stream_check --features cli
//! ```

use std::env;
use std::time::Duration;

use tda_rs::client::TdaClient;
use tda_rs::config::FileConfigStore;
use tda_rs::token::TokenManager;
use tda_rs::ws::streamer::StreamerClient;

#[tokio::main]
async fn main() -> tda_rs::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = match env::var_os("TDA_CONFIG_PATH") {
        Some(path) => FileConfigStore::new(path),
        None => FileConfigStore::in_home_dir()?,
    };
    let listen = env::var("TDA_LISTEN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(Duration::from_secs(30), Duration::from_secs);

    println!("Using configuration at {}", store.path().display());
    let manager = TokenManager::new(TdaClient::new(), store)?;
    let tokens = manager.start().await?;

    let client = TdaClient::new().with_token_source(tokens);
    let config = client.get_streamer_config().await?;

    let streamer = StreamerClient::new(config);
    streamer.on_account_activity(|activity| {
        println!(
            "[{}] {}\n{}",
            activity.account_id, activity.message_type, activity.message_data
        );
    });

    println!("Connecting to the streaming server…");
    streamer.start().await?;
    println!("Listening for account activity for {}s…", listen.as_secs());

    tokio::select! {
        _ = tokio::time::sleep(listen) => println!("Window elapsed, disconnecting…"),
        _ = tokio::signal::ctrl_c() => println!("Interrupted, disconnecting…"),
    }

    streamer.stop().await?;
    manager.stop().await?;
    println!("Done.");

    Ok(())
}
