//! Shared support for projected filesystem test programs.
//!
//! Every test program in the suite does the same few things: parse a small
//! command line, turn a symbolic result name into the number its event
//! handlers answer with, mount the filesystem under test, wait until told
//! to stop, and unmount. This crate provides those pieces so each program
//! only contains its handlers.
//!
//! # Components
//!
//! - [`Features`] / [`OptionTable`] - which options a program accepts
//! - [`ResultSpace`] - `--retval` names for libprojfs (errno) or the VFS API
//!   (`PrjFS_Result`)
//! - [`parse_opts`] / [`parse_mount_opts`] - command-line parsing into
//!   [`Settings`]
//! - [`ProjectionService`] / [`start_mount`] - mount lifecycle over a
//!   backend from [`backend`]
//! - [`wait_for_shutdown`] - block until Enter or a termination signal
//!
//! # Example
//!
//! ```no_run
//! use projfs_test_common::testing::MockService;
//! use projfs_test_common::{
//!     parse_mount_opts, start_mount_or_exit, wait_for_shutdown, Features, HarnessConfig,
//!     ShutdownToken,
//! };
//!
//! let args = parse_mount_opts(std::env::args_os(), Features::RETVAL)
//!     .unwrap_or_else(|err| err.exit());
//! let retval = args.settings.retval().unwrap_or(0);
//!
//! let config = HarnessConfig::from_env();
//! let mount = start_mount_or_exit(
//!     args.settings.program(),
//!     MockService::new(),
//!     &args.lower_path,
//!     &args.mount_path,
//!     retval,
//! );
//! wait_for_shutdown(&ShutdownToken::new(), &config);
//! mount.stop();
//! ```

#![warn(clippy::all)]

pub mod args;
pub mod backend;
pub mod config;
pub mod error;
pub mod exit_code;
pub mod logging;
pub mod mount;
pub mod options;
pub mod retval;
pub mod signal;
pub mod testing;

pub use args::{
    MOUNT_ARGS_USAGE, MountArgs, OptionValue, Settings, exit_error, parse_mount_opts, parse_opts,
};
pub use config::HarnessConfig;
pub use error::{MountError, ParseError, RetvalError, ServiceError};
pub use mount::{Mount, ProjectionService, start_mount, start_mount_or_exit};
pub use options::{ALL_OPTIONS, ArgKind, Features, OptionDescriptor, OptionId, OptionTable, program_name};
pub use retval::{PROJFS_ALLOW, PROJFS_DENY, PrjFsResult, ResultSpace, RetvalEntry, VFSAPI_PREFIX};
pub use signal::{ShutdownToken, WaitOutcome, wait_for_shutdown};
