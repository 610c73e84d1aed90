//! # Structured Logging Setup
//!
//! Console logging for the orchestration engine. Library code only emits
//! `tracing` events; embedding applications either call [`init_logging`]
//! once at startup or install their own subscriber, in which case the init
//! here backs off silently.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging filtered by `DOCPIPE_LOG` (falling back to
/// `RUST_LOG`, then `info`). Safe to call more than once; a subscriber
/// installed elsewhere wins.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("DOCPIPE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(filter)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

/// JSON console logging for deployments that ship logs to a collector.
/// Same filter resolution and same already-initialized semantics.
pub fn init_json_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("DOCPIPE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(filter)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}
