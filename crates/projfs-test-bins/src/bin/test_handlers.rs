//! Mount with projection, notification and permission handlers that answer
//! every event with the `--retval` value.
//!
//! Without `--retval`, projection and notification events succeed and
//! permission events are allowed.

use std::ffi::{c_int, c_void};
use std::process::ExitCode;

use projfs_test_common::backend::{EventHandlers, Projfs, ProjfsEvent, ProjfsHandlers, event_user_data};
use projfs_test_common::{Features, HarnessConfig, PROJFS_ALLOW};

struct HandlerState {
    retval: Option<i32>,
}

/// # Safety
///
/// `event` must come from libprojfs for a filesystem created with a
/// `HandlerState` as its user data.
unsafe fn answer(kind: &str, event: *mut ProjfsEvent, default: i32) -> c_int {
    // SAFETY: guaranteed by the caller.
    let (state, event) = unsafe { (&*event_user_data(event).cast::<HandlerState>(), &*event) };
    // SAFETY: as above.
    let path = unsafe { event.path() };
    tracing::info!(
        kind,
        mask = event.mask,
        pid = event.pid,
        path = ?path,
        "event"
    );
    state.retval.unwrap_or(default)
}

unsafe extern "C" fn handle_proj_event(event: *mut ProjfsEvent) -> c_int {
    // SAFETY: called by libprojfs with our user data.
    unsafe { answer("projection", event, 0) }
}

unsafe extern "C" fn handle_notify_event(event: *mut ProjfsEvent) -> c_int {
    // SAFETY: called by libprojfs with our user data.
    unsafe { answer("notification", event, 0) }
}

unsafe extern "C" fn handle_perm_event(event: *mut ProjfsEvent) -> c_int {
    // SAFETY: called by libprojfs with our user data.
    unsafe { answer("permission", event, PROJFS_ALLOW) }
}

fn main() -> ExitCode {
    let args = projfs_test_bins::init(Features::RETVAL);
    let config = HarnessConfig::from_env();

    let state = Box::into_raw(Box::new(HandlerState {
        retval: args.settings.retval(),
    }));
    let handlers = ProjfsHandlers {
        handle_proj_event: Some(handle_proj_event),
        handle_notify_event: Some(handle_notify_event),
        handle_perm_event: Some(handle_perm_event),
    };

    let user_data = projfs_test_bins::serve(
        &args,
        &config,
        Projfs::from_config(&config),
        EventHandlers::new(handlers, state.cast::<c_void>()),
    );

    if !user_data.is_null() {
        // SAFETY: libprojfs hands back the pointer registered above, and no
        // handler runs after stop.
        drop(unsafe { Box::from_raw(user_data.cast::<HandlerState>()) });
    }

    ExitCode::SUCCESS
}
