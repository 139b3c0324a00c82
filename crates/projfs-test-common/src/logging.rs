//! Tracing setup for test programs.

use std::io;

use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity level (number of `-v` flags, or the
/// value a driver asks for).
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a stderr subscriber. `RUST_LOG` takes precedence over
/// `verbose`.
///
/// Stdout belongs to the test program's own output, which drivers compare
/// against expected text, so logs never go there. Calling this more than
/// once is harmless; only the first subscriber is kept.
pub fn init(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into());

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();

    if let Err(e) = installed {
        tracing::debug!("keeping existing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(2), "debug");
        assert_eq!(default_filter(3), "trace");
        assert_eq!(default_filter(u8::MAX), "trace");
    }

    #[test]
    fn test_init_twice() {
        init(0);
        init(2);
        assert!(tracing::dispatcher::has_been_set());
    }
}
