//! Mount lifecycle for the filesystem under test.
//!
//! A test program creates the projection service over a lower directory,
//! starts it at the mount directory, waits, and stops it again. The backend
//! doing the work is a [`ProjectionService`]; [`start_mount`] drives the
//! create/start sequence and hands back a [`Mount`] that owns the running
//! instance until [`Mount::stop`] (or drop).

use std::path::{Path, PathBuf};

use crate::error::{MountError, ServiceError};
use crate::exit_code;

/// A backend that can project a lower directory at a mount point.
///
/// # Lifecycle
///
/// 1. [`create`](ProjectionService::create) builds the instance
/// 2. [`start`](ProjectionService::start) makes it serve requests
/// 3. [`stop`](ProjectionService::stop) tears it down and returns whatever
///    the backend hands back on shutdown
///
/// `stop` is called at most once per handle and only after a successful
/// `start`.
pub trait ProjectionService {
    /// Event handlers or callbacks registered at creation.
    type Handlers;

    /// The created instance.
    type Handle;

    /// Returned from `stop`, e.g. the user data registered at creation.
    type Stopped;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str;

    /// Create the instance.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure status if the instance cannot be
    /// created.
    fn create(
        &self,
        lower: &Path,
        mount: &Path,
        handlers: Self::Handlers,
    ) -> Result<Self::Handle, ServiceError>;

    /// Start serving.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure status if the instance does not start.
    fn start(&self, handle: &mut Self::Handle) -> Result<(), ServiceError>;

    /// Stop serving and release the instance.
    fn stop(&self, handle: Self::Handle) -> Self::Stopped;
}

/// A started projection.
///
/// Dropping an unstopped mount stops it; the stop result is discarded.
pub struct Mount<S: ProjectionService> {
    service: S,
    handle: Option<S::Handle>,
    lower: PathBuf,
    mount: PathBuf,
}

impl<S: ProjectionService> Mount<S> {
    pub fn lower_path(&self) -> &Path {
        &self.lower
    }

    pub fn mount_path(&self) -> &Path {
        &self.mount
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Stop the projection. Best effort, no retry.
    pub fn stop(mut self) -> S::Stopped {
        // `handle` is Some from start_mount until Drop, which cannot run while
        // `self` is owned here.
        let Some(handle) = self.handle.take() else {
            unreachable!("mount handle taken before stop");
        };
        self.stop_handle(handle)
    }

    fn stop_handle(&self, handle: S::Handle) -> S::Stopped {
        tracing::debug!(
            service = self.service.name(),
            mount = %self.mount.display(),
            "stopping filesystem"
        );
        self.service.stop(handle)
    }
}

impl<S: ProjectionService> Drop for Mount<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::warn!(
                mount = %self.mount.display(),
                "mount dropped without stop, stopping now"
            );
            let _ = self.stop_handle(handle);
        }
    }
}

impl<S: ProjectionService> std::fmt::Debug for Mount<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("service", &self.service.name())
            .field("lower", &self.lower)
            .field("mount", &self.mount)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

/// Create and start `service` projecting `lower` at `mount`.
///
/// # Errors
///
/// [`MountError::Create`] if creation fails, in which case start is never
/// attempted; [`MountError::Start`] if the created instance does not start.
pub fn start_mount<S: ProjectionService>(
    service: S,
    lower: impl AsRef<Path>,
    mount: impl AsRef<Path>,
    handlers: S::Handlers,
) -> Result<Mount<S>, MountError> {
    let lower = lower.as_ref();
    let mount = mount.as_ref();

    tracing::info!(
        service = service.name(),
        lower = %lower.display(),
        mount = %mount.display(),
        "starting filesystem"
    );

    let mut handle = service
        .create(lower, mount, handlers)
        .map_err(MountError::Create)?;
    service.start(&mut handle).map_err(MountError::Start)?;

    Ok(Mount {
        service,
        handle: Some(handle),
        lower: lower.to_path_buf(),
        mount: mount.to_path_buf(),
    })
}

/// [`start_mount`], terminating the process with exit code 1 on failure.
///
/// The diagnostic is printed as `<program>: <error>` on stderr.
pub fn start_mount_or_exit<S: ProjectionService>(
    program: &str,
    service: S,
    lower: impl AsRef<Path>,
    mount: impl AsRef<Path>,
    handlers: S::Handlers,
) -> Mount<S> {
    match start_mount(service, lower, mount, handlers) {
        Ok(mount) => mount,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{program}: {e}");
            std::process::exit(exit_code::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCall, MockService};

    #[test]
    fn test_create_then_start() {
        let service = MockService::new();
        let calls = service.calls();

        let mount = start_mount(service, "/lower", "/mnt", 7).unwrap();
        assert_eq!(mount.lower_path(), Path::new("/lower"));
        assert_eq!(mount.mount_path(), Path::new("/mnt"));
        assert_eq!(
            calls.snapshot(),
            [
                MockCall::Create {
                    lower: "/lower".into(),
                    mount: "/mnt".into(),
                    handlers: 7,
                },
                MockCall::Start,
            ]
        );

        assert_eq!(mount.stop(), 7);
        assert_eq!(calls.snapshot().last(), Some(&MockCall::Stop));
    }

    #[test]
    fn test_create_failure_skips_start() {
        let service = MockService::new().fail_create(ServiceError::Status(-libc::ENOMEM));
        let calls = service.calls();

        let err = start_mount(service, "/lower", "/mnt", 0).unwrap_err();
        assert!(matches!(err, MountError::Create(ServiceError::Status(s)) if s == -libc::ENOMEM));
        assert_eq!(calls.snapshot().len(), 1);
        assert!(!calls.snapshot().contains(&MockCall::Start));
    }

    #[test]
    fn test_start_failure_carries_status() {
        let service = MockService::new().fail_start(ServiceError::Status(0x2000_0001));
        let calls = service.calls();

        let err = start_mount(service, "/lower", "/mnt", 0).unwrap_err();
        assert!(matches!(err, MountError::Start(ServiceError::Status(0x2000_0001))));
        assert_eq!(
            err.to_string(),
            "unable to start filesystem: status 536870913"
        );
        // A failed start is not followed by a stop.
        assert!(!calls.snapshot().contains(&MockCall::Stop));
    }

    #[test]
    fn test_drop_stops_running_mount() {
        let service = MockService::new();
        let calls = service.calls();

        drop(start_mount(service, "/lower", "/mnt", 0).unwrap());
        assert_eq!(calls.count(&MockCall::Stop), 1);
    }

    #[test]
    fn test_explicit_stop_happens_once() {
        let service = MockService::new();
        let calls = service.calls();

        let mount = start_mount(service, "/lower", "/mnt", 0).unwrap();
        let _ = mount.stop();
        assert_eq!(calls.count(&MockCall::Stop), 1);
    }

    #[test]
    fn test_debug_shows_state() {
        let mount = start_mount(MockService::new(), "/lower", "/mnt", 0).unwrap();
        let debug = format!("{mount:?}");
        assert!(debug.contains("mock"));
        assert!(debug.contains("running: true"));
    }
}
