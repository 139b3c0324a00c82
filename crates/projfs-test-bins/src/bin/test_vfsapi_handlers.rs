//! Mount through the VFS API with a notification callback that answers
//! with the `--retval` value (default `PrjFS_Result_Success`).

use std::ffi::{CStr, c_char, c_int, c_uchar, c_uint, c_ulong};
use std::process::ExitCode;
use std::sync::OnceLock;

use projfs_test_common::backend::{PrjFsCallbacks, PrjFsStatus, VfsApi};
use projfs_test_common::{Features, HarnessConfig, PrjFsResult};

// The VFS API callbacks carry no user data.
static RETVAL: OnceLock<PrjFsStatus> = OnceLock::new();

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn notify_operation(
    command_id: c_ulong,
    relative_path: *const c_char,
    _provider_id: *mut c_uchar,
    _content_id: *mut c_uchar,
    triggering_process_id: c_int,
    _triggering_process_name: *const c_char,
    is_directory: bool,
    notification_type: c_uint,
    _destination_relative_path: *const c_char,
) -> PrjFsStatus {
    // SAFETY: the VFS API passes a NUL-terminated path or null.
    let path = (!relative_path.is_null()).then(|| unsafe { CStr::from_ptr(relative_path) });
    tracing::info!(
        command_id,
        pid = triggering_process_id,
        is_directory,
        notification_type,
        path = ?path,
        "notification"
    );
    RETVAL
        .get()
        .copied()
        .unwrap_or(PrjFsResult::Success as PrjFsStatus)
}

fn main() -> ExitCode {
    let args = projfs_test_bins::init(Features::RETVAL | Features::VFSAPI);
    let config = HarnessConfig::from_env();

    if let Some(retval) = args.settings.retval() {
        let _ = RETVAL.set(retval.cast_unsigned());
    }

    let callbacks = PrjFsCallbacks {
        notify_operation: Some(notify_operation),
        ..PrjFsCallbacks::default()
    };
    projfs_test_bins::serve(&args, &config, VfsApi::from_config(&config), callbacks);

    ExitCode::SUCCESS
}
