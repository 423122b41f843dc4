pub mod access_log;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod handlers;
pub mod job_deletion;
pub mod metadata;
pub mod metrics;
pub mod observability;
pub mod scheduler;
pub mod server;
pub mod signals;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `server.log_level`. With `log_format = "json"` every
/// event is one JSON object per line, which Cloud Logging parses into
/// structured entries.
///
/// Note: This function can only be called once.
pub fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let json = server.log_format == "json";
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(true)
    });
    let text_layer = (!json).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
