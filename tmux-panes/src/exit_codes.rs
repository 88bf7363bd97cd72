//! Stable exit codes for tmux-panes CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, unreadable input or any other error.
pub const INVALID: i32 = 1;
/// The command needs a tmux session and is not running inside one.
pub const NOT_IN_TMUX: i32 = 2;
