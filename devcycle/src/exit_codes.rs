//! Stable exit codes for devcycle CLI commands.

/// Command succeeded (for `run`: the cycle completed, converged or not).
pub const OK: i32 = 0;
/// Invalid config, transcript log I/O failure, or other errors.
pub const INVALID: i32 = 1;
/// `devcycle run --strict` finished without a passing review and test.
pub const NOT_CONVERGED: i32 = 2;
/// The agent process could not be started.
pub const LAUNCH_FAILED: i32 = 3;
/// A step exceeded its timeout and was killed.
pub const TIMED_OUT: i32 = 4;
