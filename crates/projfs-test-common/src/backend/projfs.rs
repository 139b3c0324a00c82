//! The native libprojfs API.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::io;
use std::marker::{PhantomData, PhantomPinned};
use std::path::Path;
use std::ptr::{self, NonNull};

use super::c_path;
use crate::config::HarnessConfig;
use crate::error::ServiceError;
use crate::mount::ProjectionService;

/// Opaque `struct projfs`.
#[repr(C)]
pub struct ProjfsFs {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// `struct projfs_event`, passed to every handler.
#[repr(C)]
#[derive(Debug)]
pub struct ProjfsEvent {
    pub fs: *mut ProjfsFs,
    pub mask: u64,
    pub pid: libc::pid_t,
    pub path: *const c_char,
    pub target_path: *const c_char,
    pub fd: c_int,
}

impl ProjfsEvent {
    /// Path relative to the mount, if the event carries one.
    ///
    /// # Safety
    ///
    /// `self` must be an event passed to a handler by libprojfs, used while
    /// the handler is running.
    pub unsafe fn path(&self) -> Option<&CStr> {
        // SAFETY: libprojfs passes NUL-terminated strings that live for the
        // duration of the handler call.
        (!self.path.is_null()).then(|| unsafe { CStr::from_ptr(self.path) })
    }

    /// Rename or link target, if any.
    ///
    /// # Safety
    ///
    /// Same as [`ProjfsEvent::path`].
    pub unsafe fn target_path(&self) -> Option<&CStr> {
        // SAFETY: as for `path`.
        (!self.target_path.is_null()).then(|| unsafe { CStr::from_ptr(self.target_path) })
    }
}

/// Event handler. Returns 0 (or `PROJFS_ALLOW`/`PROJFS_DENY` for
/// permission events) or a negated errno.
pub type ProjfsHandler = unsafe extern "C" fn(event: *mut ProjfsEvent) -> c_int;

/// `struct projfs_handlers`. Unset handlers are skipped by the library.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjfsHandlers {
    pub handle_proj_event: Option<ProjfsHandler>,
    pub handle_notify_event: Option<ProjfsHandler>,
    pub handle_perm_event: Option<ProjfsHandler>,
}

#[link(name = "projfs")]
unsafe extern "C" {
    fn projfs_new(
        lowerdir: *const c_char,
        mountdir: *const c_char,
        handlers: *const ProjfsHandlers,
        handlers_size: usize,
        user_data: *mut c_void,
        argc: c_int,
        argv: *const *const c_char,
    ) -> *mut ProjfsFs;

    fn projfs_get_user_data(fs: *mut ProjfsFs) -> *mut c_void;

    fn projfs_start(fs: *mut ProjfsFs) -> c_int;

    fn projfs_stop(fs: *mut ProjfsFs) -> *mut c_void;
}

/// User data registered with the filesystem that raised `event`.
///
/// # Safety
///
/// `event` must be an event passed to a handler by libprojfs.
pub unsafe fn event_user_data(event: *const ProjfsEvent) -> *mut c_void {
    // SAFETY: the caller guarantees `event` and its `fs` are live.
    unsafe { projfs_get_user_data((*event).fs) }
}

/// What a libprojfs instance is created with.
#[derive(Debug, Clone, Copy)]
pub struct EventHandlers {
    /// `None` mounts a plain passthrough.
    pub handlers: Option<ProjfsHandlers>,
    /// Returned by [`event_user_data`] and by `stop`.
    pub user_data: *mut c_void,
}

impl EventHandlers {
    pub fn passthrough() -> Self {
        Self {
            handlers: None,
            user_data: ptr::null_mut(),
        }
    }

    pub fn new(handlers: ProjfsHandlers, user_data: *mut c_void) -> Self {
        Self {
            handlers: Some(handlers),
            user_data,
        }
    }
}

/// A created libprojfs instance.
#[derive(Debug)]
pub struct ProjfsHandle {
    fs: NonNull<ProjfsFs>,
}

impl ProjfsHandle {
    pub fn as_ptr(&self) -> *mut ProjfsFs {
        self.fs.as_ptr()
    }

    /// The user data registered at creation.
    pub fn user_data(&self) -> *mut c_void {
        // SAFETY: `fs` came from `projfs_new` and is not stopped yet.
        unsafe { projfs_get_user_data(self.fs.as_ptr()) }
    }
}

/// The libprojfs backend.
#[derive(Debug, Clone, Default)]
pub struct Projfs {
    service_args: Vec<String>,
}

impl Projfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend passing `config.service_args` to `projfs_new`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            service_args: config.service_args.clone(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.service_args.push(arg.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.service_args
    }

    fn c_args(&self) -> Result<Vec<CString>, ServiceError> {
        self.service_args
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| ServiceError::InvalidArgument(arg.clone()))
            })
            .collect()
    }
}

impl ProjectionService for Projfs {
    type Handlers = EventHandlers;
    type Handle = ProjfsHandle;
    type Stopped = *mut c_void;

    fn name(&self) -> &'static str {
        "libprojfs"
    }

    fn create(
        &self,
        lower: &Path,
        mount: &Path,
        handlers: EventHandlers,
    ) -> Result<ProjfsHandle, ServiceError> {
        let lower = c_path(lower)?;
        let mount = c_path(mount)?;
        let args = self.c_args()?;
        let argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        let argc = c_int::try_from(argv.len())
            .map_err(|_| ServiceError::InvalidArgument(format!("{} arguments", argv.len())))?;

        let (table, size) = match handlers.handlers.as_ref() {
            Some(table) => (ptr::from_ref(table), size_of::<ProjfsHandlers>()),
            None => (ptr::null(), 0),
        };

        tracing::debug!(args = ?self.service_args, "projfs_new");

        // SAFETY: all pointers are valid for the call; libprojfs copies the
        // paths, handler table and arguments before returning.
        let fs = unsafe {
            projfs_new(
                lower.as_ptr(),
                mount.as_ptr(),
                table,
                size,
                handlers.user_data,
                argc,
                argv.as_ptr(),
            )
        };

        NonNull::new(fs)
            .map(|fs| ProjfsHandle { fs })
            .ok_or_else(|| ServiceError::Os(io::Error::last_os_error()))
    }

    fn start(&self, handle: &mut ProjfsHandle) -> Result<(), ServiceError> {
        // SAFETY: the handle came from `projfs_new`.
        let res = unsafe { projfs_start(handle.as_ptr()) };
        if res < 0 {
            return Err(ServiceError::Os(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn stop(&self, handle: ProjfsHandle) -> *mut c_void {
        // SAFETY: the handle came from `projfs_new`; `projfs_stop` frees it
        // and the handle is consumed here.
        unsafe { projfs_stop(handle.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_table_layout() {
        assert_eq!(
            size_of::<ProjfsHandlers>(),
            3 * size_of::<Option<ProjfsHandler>>()
        );
        let table = ProjfsHandlers::default();
        assert!(table.handle_proj_event.is_none());
        assert!(table.handle_perm_event.is_none());
    }

    #[test]
    fn test_service_args() {
        let config = HarnessConfig::default().service_arg("--log=/tmp/projfs.log");
        let service = Projfs::from_config(&config).arg("initial");
        assert_eq!(service.args(), ["--log=/tmp/projfs.log", "initial"]);
        assert_eq!(service.c_args().unwrap().len(), 2);

        let service = Projfs::new().arg("bad\0arg");
        assert!(matches!(
            service.c_args(),
            Err(ServiceError::InvalidArgument(arg)) if arg == "bad\0arg"
        ));
    }

    #[test]
    fn test_event_paths() {
        let path = c"dir/file";
        let event = ProjfsEvent {
            fs: ptr::null_mut(),
            mask: 0,
            pid: 1,
            path: path.as_ptr(),
            target_path: ptr::null(),
            fd: -1,
        };
        // SAFETY: the strings outlive the event.
        unsafe {
            assert_eq!(event.path(), Some(path));
            assert_eq!(event.target_path(), None);
        }
    }
}
