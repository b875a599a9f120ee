//! # Runtime Diagnostics
//!
//! Setup for the `tracing` output the runtime itself emits (worker assignment,
//! registration, shutdown sequencing). This is separate from the in-substrate
//! logging process, which carries application log lines as messages.

/// Initializes the global tracing subscriber with environment-based filtering,
/// so log levels are controlled via the `RUST_LOG` env var. Call once at
/// program start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
