//! Harness configuration.
//!
//! Defaults match what the test suite expects when a program is run by
//! hand. Drivers that run programs unattended can adjust them through the
//! environment, see [`HarnessConfig::from_env`].

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

/// Overrides [`HarnessConfig::pool_thread_count`].
pub const ENV_POOL_THREADS: &str = "PROJFS_TEST_POOL_THREADS";
/// Whitespace-separated extra arguments for the projection service.
pub const ENV_SERVICE_ARGS: &str = "PROJFS_TEST_SERVICE_ARGS";
/// Overrides [`HarnessConfig::prompt`].
pub const ENV_PROMPT: &str = "PROJFS_TEST_PROMPT";

/// Prompt shown when waiting for an interactive user.
pub const DEFAULT_PROMPT: &str = "hit Enter to stop: ";

/// Options for starting and waiting on the filesystem under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Printed before waiting for a line on an interactive stdin.
    pub prompt: String,

    /// Signals that end the wait when stdin is not a terminal.
    ///
    /// Must not contain signals `signal-hook` refuses to handle, such as
    /// `SIGKILL` or `SIGSEGV`.
    pub signals: Vec<i32>,

    /// Worker threads requested from the VFS API.
    pub pool_thread_count: u32,

    /// Extra arguments passed to `projfs_new`, e.g. `--log=/tmp/projfs.log`
    /// or `initial`.
    pub service_args: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            signals: vec![SIGTERM, SIGINT, SIGHUP],
            pool_thread_count: 1,
            service_args: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with the `PROJFS_TEST_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_POOL_THREADS) {
            match value.trim().parse::<u32>() {
                Ok(count) if count > 0 => self.pool_thread_count = count,
                _ => tracing::warn!(
                    variable = ENV_POOL_THREADS,
                    %value,
                    "ignoring invalid thread count"
                ),
            }
        }

        if let Some(value) = lookup(ENV_SERVICE_ARGS) {
            self.service_args = value.split_whitespace().map(str::to_string).collect();
        }

        if let Some(prompt) = lookup(ENV_PROMPT) {
            self.prompt = prompt;
        }

        self
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn signals(mut self, signals: impl IntoIterator<Item = i32>) -> Self {
        self.signals = signals.into_iter().collect();
        self
    }

    #[must_use]
    pub fn pool_thread_count(mut self, count: u32) -> Self {
        self.pool_thread_count = count;
        self
    }

    /// Appends one argument for the projection service.
    #[must_use]
    pub fn service_arg(mut self, arg: impl Into<String>) -> Self {
        self.service_args.push(arg.into());
        self
    }
}
