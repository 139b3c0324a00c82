//! Waiting for the end of a test run.
//!
//! A mounted test program keeps the filesystem up until someone tells it to
//! stop. Run by hand, that is a line typed on the terminal; run by a test
//! driver, it is a termination signal. [`wait_for_shutdown`] picks the right
//! source by looking at stdin and returns once either it or the caller's
//! [`ShutdownToken`] fires.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use signal_hook::iterator::Signals;

use crate::config::HarnessConfig;

/// What ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A line (or end of file) was read from the terminal.
    Input,
    /// One of the configured signals arrived.
    Signal(i32),
    /// [`ShutdownToken::cancel`] was called.
    Cancelled,
}

#[derive(Debug, Default)]
struct TokenState {
    outcome: Mutex<Option<WaitOutcome>>,
    cvar: Condvar,
}

/// Cancellation token shared between the waiting thread and whatever ends
/// the wait.
///
/// Cloning is cheap; all clones observe the same state. The first outcome
/// recorded is kept.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    state: Arc<TokenState>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the wait with [`WaitOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.finish(WaitOutcome::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.outcome.lock().is_some()
    }

    /// The recorded outcome, if the token has fired.
    pub fn outcome(&self) -> Option<WaitOutcome> {
        *self.state.outcome.lock()
    }

    /// Block until the token fires.
    pub fn wait(&self) -> WaitOutcome {
        let mut outcome = self.state.outcome.lock();
        loop {
            if let Some(outcome) = *outcome {
                return outcome;
            }
            self.state.cvar.wait(&mut outcome);
        }
    }

    /// Block until the token fires or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.state.outcome.lock();
        while outcome.is_none() {
            if self.state.cvar.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        *outcome
    }

    fn finish(&self, result: WaitOutcome) {
        let mut outcome = self.state.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(result);
            self.state.cvar.notify_all();
        }
    }
}

/// Block until the test run should end.
///
/// If stdin is a terminal, prints `config.prompt` and waits for a line.
/// Otherwise waits for one of `config.signals`. Either way the wait also
/// ends when `token` is cancelled. There is no timeout.
///
/// Failing to inspect stdin or to register the signals is logged and the
/// wait continues on the remaining sources.
pub fn wait_for_shutdown(token: &ShutdownToken, config: &HarnessConfig) -> WaitOutcome {
    let terminal = nix::unistd::isatty(io::stdin());
    wait_on(token, config, terminal, || io::BufReader::new(io::stdin()))
}

fn wait_on<R, F>(
    token: &ShutdownToken,
    config: &HarnessConfig,
    terminal: nix::Result<bool>,
    input: F,
) -> WaitOutcome
where
    R: BufRead + Send + 'static,
    F: FnOnce() -> R,
{
    match terminal {
        Ok(true) => {
            print!("{}", config.prompt);
            if let Err(e) = io::stdout().flush() {
                tracing::debug!("Failed to flush prompt: {}", e);
            }
            wait_for_line(token, input())
        }
        Ok(false) => wait_for_signal(token, &config.signals),
        Err(errno) => {
            tracing::warn!("unable to check stdin: {}", errno);
            wait_for_signal(token, &config.signals)
        }
    }
}

/// Wait for one line from `reader`, or for the token.
///
/// The reader thread is not joined: when the token fires first it stays
/// blocked on the read until the process exits.
pub(crate) fn wait_for_line<R>(token: &ShutdownToken, reader: R) -> WaitOutcome
where
    R: BufRead + Send + 'static,
{
    let reader_token = token.clone();
    let spawned = std::thread::Builder::new()
        .name("shutdown-input".into())
        .spawn(move || {
            let mut reader = reader;
            let mut line = String::new();
            if let Err(e) = reader.read_line(&mut line) {
                tracing::warn!("Failed to read from stdin: {}", e);
            }
            reader_token.finish(WaitOutcome::Input);
        });

    if let Err(e) = spawned {
        tracing::warn!("Failed to start input thread: {}", e);
    }

    token.wait()
}

/// Wait for one of `signals`, or for the token.
///
/// The handlers are registered for the duration of the wait only and are
/// unregistered before returning.
pub(crate) fn wait_for_signal(token: &ShutdownToken, signals: &[i32]) -> WaitOutcome {
    let mut incoming = match Signals::new(signals) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::warn!("unable to set signal handler: {}", e);
            return token.wait();
        }
    };
    let handle = incoming.handle();

    let signal_token = token.clone();
    let watcher = std::thread::Builder::new()
        .name("shutdown-signal".into())
        .spawn(move || {
            if let Some(signal) = incoming.forever().next() {
                tracing::info!(signal, "shutdown signal received");
                signal_token.finish(WaitOutcome::Signal(signal));
            }
        });

    match watcher {
        Ok(watcher) => {
            let outcome = token.wait();
            handle.close();
            if watcher.join().is_err() {
                tracing::warn!("signal watcher panicked");
            }
            outcome
        }
        Err(e) => {
            tracing::warn!("Failed to start signal thread: {}", e);
            handle.close();
            token.wait()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_hook::consts::signal::SIGUSR1;
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = ShutdownToken::new();
        let canceller = token.clone();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert_eq!(token.wait(), WaitOutcome::Cancelled);
        assert!(token.is_cancelled());
        thread.join().unwrap();
    }

    #[test]
    fn test_first_outcome_wins() {
        let token = ShutdownToken::new();
        token.finish(WaitOutcome::Signal(15));
        token.cancel();
        assert_eq!(token.outcome(), Some(WaitOutcome::Signal(15)));
        assert_eq!(token.wait(), WaitOutcome::Signal(15));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = ShutdownToken::new();
        let start = Instant::now();
        assert_eq!(token.wait_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_line_ends_wait() {
        let token = ShutdownToken::new();
        let outcome = wait_for_line(&token, Cursor::new(b"\n".to_vec()));
        assert_eq!(outcome, WaitOutcome::Input);
    }

    #[test]
    fn test_eof_ends_wait() {
        let token = ShutdownToken::new();
        let outcome = wait_for_line(&token, Cursor::new(Vec::new()));
        assert_eq!(outcome, WaitOutcome::Input);
    }

    #[test]
    fn test_terminal_waits_for_line() {
        let token = ShutdownToken::new();
        let config = HarnessConfig::default().prompt("");
        let outcome = wait_on(&token, &config, Ok(true), || Cursor::new(b"\n".to_vec()));
        assert_eq!(outcome, WaitOutcome::Input);
    }

    #[test]
    fn test_non_terminal_waits_for_token() {
        let token = ShutdownToken::new();
        token.cancel();
        let config = HarnessConfig::default().signals([SIGUSR1]);
        let outcome = wait_on(&token, &config, Ok(false), || -> Cursor<Vec<u8>> {
            panic!("stdin must not be read")
        });
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_tty_check_failure_falls_back_to_signals() {
        let token = ShutdownToken::new();
        token.cancel();
        let config = HarnessConfig::default().signals([SIGUSR1]);
        let outcome = wait_on(&token, &config, Err(nix::errno::Errno::EBADF), || {
            Cursor::new(Vec::new())
        });
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_shutdown_returns_once_cancelled() {
        let token = ShutdownToken::new();
        token.cancel();
        let config = HarnessConfig::default().prompt("").signals([SIGUSR1]);
        assert_eq!(wait_for_shutdown(&token, &config), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_before_signal() {
        let token = ShutdownToken::new();
        token.cancel();
        assert_eq!(wait_for_signal(&token, &[SIGUSR1]), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_signal_ends_wait() {
        // Keep the default action (terminate) away while the waiter registers.
        let guard = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGUSR1, Arc::clone(&guard)).unwrap();

        let token = ShutdownToken::new();
        let waiter_token = token.clone();
        let waiter = std::thread::spawn(move || wait_for_signal(&waiter_token, &[SIGUSR1]));

        while token.wait_timeout(Duration::from_millis(50)).is_none() {
            signal_hook::low_level::raise(SIGUSR1).unwrap();
        }

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signal(SIGUSR1));
    }
}
