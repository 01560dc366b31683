//! Stable exit codes for mint CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, queue reference, queue document or agent spawn errors.
pub const INVALID: i32 = 1;
/// `mint doctor` found at least one failing check.
pub const ISSUES: i32 = 2;
