//! Process exit codes shared by the test programs.
//!
//! Test drivers only distinguish success from failure, so there are no
//! finer-grained categories.

/// Help was printed, or the test ran to completion.
pub const SUCCESS: i32 = libc::EXIT_SUCCESS;

/// Usage error, invalid argument, or the filesystem failed to come up.
pub const FAILURE: i32 = libc::EXIT_FAILURE;
