//! Stable exit codes for agent-runner CLI commands.

/// Run succeeded, dry run printed its plan, or status was reported.
pub const OK: i32 = 0;
/// Invalid arguments or config, executor lock held, no provider available,
/// provisioning failure, or an agent killed by a signal.
pub const INVALID: i32 = 1;
/// The agent failed with rate-limit text on stderr; the provider is cooling down.
/// A provider that itself exits with `2` is reported as [`INVALID`].
pub const RATE_LIMITED: i32 = 2;
