//! Diagnostic tracing for the runner.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`. It is separate from
//! the product output: the JSON run plan on stdout and the agent's own
//! inherited stdout/stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=agent_runner=debug agent-runner run --task "fix flaky test" --dry-run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
