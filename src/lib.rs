pub mod config;
pub mod http_cache;
pub mod http_client;
pub mod names;
pub mod orchestrator;
pub mod rank;
pub mod results_fetch;
pub mod schedule;
pub mod scheduler;
pub mod score;
pub mod seed;
pub mod sheet;
pub mod sheet_export;
pub mod tally;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `.env.local` wins over `.env`; neither is required.
pub fn load_env() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "f1_predictions=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
