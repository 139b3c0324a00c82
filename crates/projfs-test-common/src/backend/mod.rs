//! Projection service backends from libprojfs.
//!
//! - [`Projfs`] (feature `libprojfs`): the native `projfs_*` API with
//!   projection, notification and permission event handlers
//! - [`VfsApi`] (feature `vfsapi`): the `PrjFS_*` virtualization API

#[cfg(feature = "libprojfs")]
mod projfs;
#[cfg(feature = "vfsapi")]
mod vfsapi;

#[cfg(feature = "libprojfs")]
pub use projfs::{
    EventHandlers, Projfs, ProjfsEvent, ProjfsFs, ProjfsHandle, ProjfsHandler, ProjfsHandlers,
    event_user_data,
};
#[cfg(feature = "vfsapi")]
pub use vfsapi::{
    PLACEHOLDER_ID_LENGTH, PrjFsCallbacks, PrjFsEnumerateDirectory, PrjFsFileHandle,
    PrjFsGetFileStream, PrjFsLogError, PrjFsMountHandle, PrjFsNotifyOperation, PrjFsStatus,
    VfsApi, VfsApiHandle,
};

#[cfg(any(feature = "libprojfs", feature = "vfsapi"))]
pub(crate) fn c_path(path: &std::path::Path) -> Result<std::ffi::CString, crate::ServiceError> {
    use std::os::unix::ffi::OsStrExt;

    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| crate::ServiceError::InvalidPath(path.to_path_buf()))
}
