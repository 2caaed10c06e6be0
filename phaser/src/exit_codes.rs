//! Stable exit codes for phaser CLI commands.

/// Command succeeded, or `phaser plan` found pending work.
pub const OK: i32 = 0;
/// Command failed due to invalid config, catalogs, ledger, or arguments.
pub const INVALID: i32 = 1;
/// `phaser plan` found nothing pending (session complete).
pub const COMPLETE: i32 = 2;
/// `phaser run` stopped on an unexpected error; progress up to it is saved.
pub const ABORTED: i32 = 3;
/// `phaser run` was interrupted; progress up to the last task is saved.
pub const INTERRUPTED: i32 = 130;
