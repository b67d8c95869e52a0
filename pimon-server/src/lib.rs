//! PiMon server - HTTP surface and process wiring around `pimon-core`.

pub mod app;
pub mod config;
pub mod http;

pub use app::{start, Sources};
pub use config::{load_config, Config};
pub use http::{build_router, AppState};

/// `RUST_LOG` wins; otherwise info for the PiMon crates.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pimon_server=info,pimon_core=info")),
        )
        .init();
}
