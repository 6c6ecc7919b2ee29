//! `taskclock-cloud`: record service for `TaskClock` clients.
//!
//! An axum WebSocket server holding one isolated record zone per user.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin taskclock-cloud
//!
//! # Run on custom address
//! cargo run --bin taskclock-cloud -- --bind 127.0.0.1:8080
//! ```

use std::sync::Arc;

use clap::Parser;
use taskclock_cloud::config::{CloudCliArgs, CloudConfig};
use taskclock_cloud::server::{self, CloudState};
use taskclock_cloud::store::RecordStore;

#[tokio::main]
async fn main() {
    let cli = CloudCliArgs::parse();

    let config = match CloudConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        max_frame_size = config.max_frame_size,
        max_records_per_user = config.max_records_per_user,
        "starting taskclock record service"
    );

    let store = RecordStore::with_max_records(config.max_records_per_user);
    let state = Arc::new(CloudState::with_config(config.max_frame_size, store));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "record service listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "record service task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start record service");
            std::process::exit(1);
        }
    }
}
