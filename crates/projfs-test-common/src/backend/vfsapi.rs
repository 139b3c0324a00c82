//! The `PrjFS_*` virtualization API of libprojfs.

use std::ffi::{c_char, c_int, c_uchar, c_uint, c_ulong};
use std::marker::{PhantomData, PhantomPinned};
use std::path::Path;
use std::ptr::{self, NonNull};

use super::c_path;
use crate::config::HarnessConfig;
use crate::error::ServiceError;
use crate::mount::ProjectionService;
use crate::retval::PrjFsResult;

/// Size of provider and content IDs.
pub const PLACEHOLDER_ID_LENGTH: usize = 128;

/// Opaque `PrjFS_MountHandle`.
#[repr(C)]
pub struct PrjFsMountHandle {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque `PrjFS_FileHandle`.
#[repr(C)]
pub struct PrjFsFileHandle {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Raw `PrjFS_Result` as it crosses the C boundary.
pub type PrjFsStatus = c_uint;

pub type PrjFsEnumerateDirectory = unsafe extern "C" fn(
    command_id: c_ulong,
    relative_path: *const c_char,
    triggering_process_id: c_int,
    triggering_process_name: *const c_char,
) -> PrjFsStatus;

pub type PrjFsGetFileStream = unsafe extern "C" fn(
    command_id: c_ulong,
    relative_path: *const c_char,
    provider_id: *const c_uchar,
    content_id: *const c_uchar,
    triggering_process_id: c_int,
    triggering_process_name: *const c_char,
    file_handle: *mut PrjFsFileHandle,
) -> PrjFsStatus;

pub type PrjFsNotifyOperation = unsafe extern "C" fn(
    command_id: c_ulong,
    relative_path: *const c_char,
    provider_id: *mut c_uchar,
    content_id: *mut c_uchar,
    triggering_process_id: c_int,
    triggering_process_name: *const c_char,
    is_directory: bool,
    notification_type: c_uint,
    destination_relative_path: *const c_char,
) -> PrjFsStatus;

pub type PrjFsLogError = unsafe extern "C" fn(error_message: *const c_char);

/// `PrjFS_Callbacks`, passed by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PrjFsCallbacks {
    pub enumerate_directory: Option<PrjFsEnumerateDirectory>,
    pub get_file_stream: Option<PrjFsGetFileStream>,
    pub notify_operation: Option<PrjFsNotifyOperation>,
    pub log_error: Option<PrjFsLogError>,
}

#[link(name = "projfs")]
unsafe extern "C" {
    fn PrjFS_StartVirtualizationInstance(
        storage_root_full_path: *const c_char,
        virtualization_root_full_path: *const c_char,
        callbacks: PrjFsCallbacks,
        pool_thread_count: c_uint,
        mount_handle: *mut *mut PrjFsMountHandle,
    ) -> PrjFsStatus;

    fn PrjFS_StopVirtualizationInstance(mount_handle: *const PrjFsMountHandle);
}

/// A running VFS API instance.
#[derive(Debug)]
pub struct VfsApiHandle {
    handle: NonNull<PrjFsMountHandle>,
}

/// The VFS API backend.
///
/// The API creates and starts in a single call, so all the work happens in
/// `create` and `start` has nothing left to do.
#[derive(Debug, Clone)]
pub struct VfsApi {
    pool_thread_count: u32,
}

impl Default for VfsApi {
    fn default() -> Self {
        Self {
            pool_thread_count: 1,
        }
    }
}

impl VfsApi {
    pub fn new(pool_thread_count: u32) -> Self {
        Self { pool_thread_count }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.pool_thread_count)
    }

    pub fn pool_thread_count(&self) -> u32 {
        self.pool_thread_count
    }
}

impl ProjectionService for VfsApi {
    type Handlers = PrjFsCallbacks;
    type Handle = VfsApiHandle;
    type Stopped = ();

    fn name(&self) -> &'static str {
        "vfsapi"
    }

    fn create(
        &self,
        lower: &Path,
        mount: &Path,
        callbacks: PrjFsCallbacks,
    ) -> Result<VfsApiHandle, ServiceError> {
        let storage_root = c_path(lower)?;
        let virtualization_root = c_path(mount)?;
        let mut handle = ptr::null_mut();

        tracing::debug!(pool_threads = self.pool_thread_count, "PrjFS_StartVirtualizationInstance");

        // SAFETY: the paths are valid C strings for the call and `handle`
        // is a valid out pointer.
        let status = unsafe {
            PrjFS_StartVirtualizationInstance(
                storage_root.as_ptr(),
                virtualization_root.as_ptr(),
                callbacks,
                self.pool_thread_count,
                &raw mut handle,
            )
        };

        if status != PrjFsResult::Success as PrjFsStatus {
            return Err(ServiceError::Status(status as i32));
        }

        NonNull::new(handle)
            .map(|handle| VfsApiHandle { handle })
            .ok_or(ServiceError::Status(PrjFsResult::EInvalidHandle.code()))
    }

    fn start(&self, _handle: &mut VfsApiHandle) -> Result<(), ServiceError> {
        Ok(())
    }

    fn stop(&self, handle: VfsApiHandle) {
        // SAFETY: the handle came from a successful start and is consumed.
        unsafe { PrjFS_StopVirtualizationInstance(handle.handle.as_ptr()) }
    }
}
