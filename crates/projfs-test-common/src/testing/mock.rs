//! In-process projection service that records what it is asked to do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ServiceError;
use crate::mount::ProjectionService;

/// One call made on a [`MockService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create {
        lower: PathBuf,
        mount: PathBuf,
        handlers: i32,
    },
    Start,
    Stop,
}

/// Shared view of a [`MockService`]'s calls, usable after the service has
/// been moved into a mount.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl CallLog {
    pub fn snapshot(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &MockCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: MockCall) {
        tracing::debug!("mock call: {:?}", call);
        self.calls.lock().push(call);
    }
}

/// A [`ProjectionService`] whose handlers are a plain integer.
///
/// The integer is kept in the handle and returned from `stop`, the same way
/// libprojfs hands back its user data.
#[derive(Debug, Default)]
pub struct MockService {
    log: CallLog,
    create_error: Mutex<Option<ServiceError>>,
    start_error: Mutex<Option<ServiceError>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` fail with `error`.
    #[must_use]
    pub fn fail_create(self, error: ServiceError) -> Self {
        *self.create_error.lock() = Some(error);
        self
    }

    /// Make the next `start` fail with `error`.
    #[must_use]
    pub fn fail_start(self, error: ServiceError) -> Self {
        *self.start_error.lock() = Some(error);
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

impl ProjectionService for MockService {
    type Handlers = i32;
    type Handle = i32;
    type Stopped = i32;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(&self, lower: &Path, mount: &Path, handlers: i32) -> Result<i32, ServiceError> {
        self.log.push(MockCall::Create {
            lower: lower.to_path_buf(),
            mount: mount.to_path_buf(),
            handlers,
        });
        match self.create_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(handlers),
        }
    }

    fn start(&self, _handle: &mut i32) -> Result<(), ServiceError> {
        self.log.push(MockCall::Start);
        match self.start_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn stop(&self, handle: i32) -> i32 {
        self.log.push(MockCall::Stop);
        handle
    }
}
