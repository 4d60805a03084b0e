pub mod aggregation;
pub mod annotations;
pub mod auth;
pub mod backend;
pub mod comparison;
pub mod config;
pub mod dashboard;
mod error;
pub mod period;
pub mod persist;
pub mod session;
pub mod view;

pub use config::ClientConfig;
pub use dashboard::{Dashboard, DashboardState};
pub use error::InsightsError;

/// Install the global `tracing` subscriber. Honors `RUST_LOG`, defaults to
/// `info`. Returns false when a subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok()
}
