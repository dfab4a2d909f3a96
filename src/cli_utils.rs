//! Helpers shared by the `lifeecd`, `lifeec-seed` and `lifeec-migrate` binaries.

use std::process;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "lifeec=info,tower_http=info";

/// Installs the global `tracing` subscriber: an `EnvFilter` read from `RUST_LOG`
/// (falling back to `default_filter`) and the fmt layer.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Exits the program with an error message
pub fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Exits the program with an error message and usage information
pub fn exit_with_usage_error(message: &str, usage: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("{}", usage);
    process::exit(1);
}

/// Rejects leftover positional arguments.
pub fn reject_free_arguments(free: &[String], usage: &str) {
    if !free.is_empty() {
        exit_with_usage_error(&format!("Unexpected arguments: {:?}", free), usage);
    }
}
