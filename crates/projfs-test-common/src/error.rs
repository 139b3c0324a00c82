//! Error types for option parsing and the mount harness.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exit_code;

/// A `--retval` name that is not in the active result space.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetvalError {
    #[error("invalid retval: {0}")]
    Unknown(String),
}

/// Why argument parsing stopped.
///
/// Every variant is terminal: [`ParseError::exit`] prints the message to the
/// right stream and ends the process with [`ParseError::exit_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// `-h` or `--help` was given.
    #[error("{usage}")]
    Help { usage: String },

    /// Wrong number of positional arguments.
    #[error("{usage}")]
    Usage { usage: String },

    /// An option that is not compiled into this program.
    #[error("{program}: invalid option: {option}")]
    InvalidOption {
        program: String,
        option: String,
        usage: String,
    },

    /// A `--retval` name that does not resolve.
    #[error("{program}: invalid retval: {value}")]
    InvalidRetval {
        program: String,
        value: String,
        usage: String,
    },
}

impl ParseError {
    /// Usage line regenerated for this program.
    pub fn usage(&self) -> &str {
        match self {
            ParseError::Help { usage }
            | ParseError::Usage { usage }
            | ParseError::InvalidOption { usage, .. }
            | ParseError::InvalidRetval { usage, .. } => usage,
        }
    }

    pub fn is_help(&self) -> bool {
        matches!(self, ParseError::Help { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_help() {
            exit_code::SUCCESS
        } else {
            exit_code::FAILURE
        }
    }

    /// Print the message and terminate the process.
    ///
    /// Help goes to stdout; everything else goes to stderr, followed by the
    /// usage line when the message is a diagnostic.
    pub fn exit(&self) -> ! {
        match self {
            ParseError::Help { usage } => println!("{usage}"),
            ParseError::Usage { usage } => eprintln!("{usage}"),
            ParseError::InvalidOption { usage, .. } | ParseError::InvalidRetval { usage, .. } => {
                eprintln!("{self}");
                eprintln!("{usage}");
            }
        }
        std::process::exit(self.exit_code())
    }
}

/// Failure reported by a filesystem service backend.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The backend returned a status code other than success.
    #[error("status {0}")]
    Status(i32),

    /// The backend failed and left the reason in `errno`.
    #[error(transparent)]
    Os(#[from] io::Error),

    /// The path cannot be passed to C.
    #[error("path contains a NUL byte: {}", .0.display())]
    InvalidPath(PathBuf),

    /// An extra service argument cannot be passed to C.
    #[error("service argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),
}

/// Errors that can occur while bringing a mount up.
#[derive(Debug, Error)]
pub enum MountError {
    /// The service could not be created.
    #[error("unable to create filesystem: {0}")]
    Create(#[source] ServiceError),

    /// The service was created but did not start.
    #[error("unable to start filesystem: {0}")]
    Start(#[source] ServiceError),
}
