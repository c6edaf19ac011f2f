//! C interface to the syncdock lifecycle controller.
//!
//! Every export drives the process-wide [`Controller`]. Integers returned
//! are [`ExitCode`] values; strings returned are heap-allocated and must be
//! released with [`syncdock_free_string`]. No panic crosses this boundary:
//! one that escapes the controller is reported as the internal-error code,
//! or as a null string.

#![allow(unsafe_code)]

mod callback;

pub use callback::LogCallback;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::OnceLock;
use syncdock_core::{logbridge, Controller, ExitCode, StartOptions};
use tracing::debug;

static LOGGING: OnceLock<c_int> = OnceLock::new();

fn guarded(f: impl FnOnce() -> c_int) -> c_int {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(ExitCode::InternalError.as_i32())
}

fn guarded_string(f: impl FnOnce() -> String) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(f))
        .ok()
        .and_then(|s| CString::new(s).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Borrowed C string as owned UTF-8; null or invalid input reads as empty.
///
/// # Safety
///
/// `p` is null or points to a NUL-terminated string valid for the call.
unsafe fn arg_string(p: *const c_char) -> String {
    if p.is_null() {
        return String::new();
    }
    CStr::from_ptr(p).to_str().map(str::to_owned).unwrap_or_default()
}

/// Register (or, with null, remove) the host log receiver.
///
/// May be called at any time, before or after `syncdock_init_logging`.
#[no_mangle]
pub extern "C" fn syncdock_set_logging_callback(callback: Option<LogCallback>) {
    callback::set(callback);
}

/// Route everything the library logs to the registered callback.
///
/// Idempotent. Returns 0, or the internal-error code if another logger
/// already owns the process.
#[no_mangle]
pub extern "C" fn syncdock_init_logging() -> c_int {
    *LOGGING.get_or_init(|| {
        guarded(|| match logbridge::install(callback::forward) {
            Ok(()) => {
                debug!("logging bridge installed");
                ExitCode::Success.as_i32()
            }
            Err(_) => ExitCode::InternalError.as_i32(),
        })
    })
}

/// Bootstrap and run the engine, blocking until it terminates.
///
/// String arguments may be null or empty to mean "not given". Returns the
/// instance's exit code, or the code of the stage that failed.
///
/// # Safety
///
/// Every non-null string argument must point to a NUL-terminated string
/// that stays valid for the duration of the call.
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn syncdock_run_instance(
    config_dir: *const c_char,
    data_dir: *const c_char,
    gui_address: *const c_char,
    gui_api_key: *const c_char,
    verbose: bool,
    allow_newer_config: bool,
    no_default_config: bool,
    ensure_config_dir_exists: bool,
    ensure_data_dir_exists: bool,
) -> c_int {
    let opts = StartOptions {
        config_dir: arg_string(config_dir),
        data_dir: arg_string(data_dir),
        gui_address: arg_string(gui_address),
        gui_api_key: arg_string(gui_api_key),
        verbose,
        allow_newer_config,
        no_default_config,
        ensure_config_dir_exists,
        ensure_data_dir_exists,
    };
    guarded(|| Controller::global().start(&opts).as_i32())
}

/// Ask the running instance to stop cleanly. Does not wait.
#[no_mangle]
pub extern "C" fn syncdock_stop_instance() -> c_int {
    guarded(|| Controller::global().stop(ExitCode::Success).as_i32())
}

/// Ask the running instance to stop, reporting `code` from the blocked
/// `syncdock_run_instance` call. Does not wait.
///
/// Codes 1 to 4, -1 and -2 are reserved and refused with the internal-error
/// code; the instance keeps running.
#[no_mangle]
pub extern "C" fn syncdock_stop_instance_with(code: c_int) -> c_int {
    guarded(|| {
        Controller::global()
            .stop(ExitCode::from_i32(code))
            .as_i32()
    })
}

/// 0 idle, 1 starting, 2 running, 3 stopping.
#[no_mangle]
pub extern "C" fn syncdock_instance_state() -> c_int {
    guarded(|| Controller::global().state().as_i32())
}

/// Delete the engine database. Refused unless the controller is idle.
#[no_mangle]
pub extern "C" fn syncdock_reset_database() -> c_int {
    guarded(|| Controller::global().reset_database().as_i32())
}

/// Device identity, or an empty string before any certificate was loaded.
#[no_mangle]
pub extern "C" fn syncdock_own_device_id() -> *mut c_char {
    guarded_string(|| Controller::global().own_device_id().to_string())
}

#[no_mangle]
pub extern "C" fn syncdock_version() -> *mut c_char {
    guarded_string(syncdock_core::version)
}

#[no_mangle]
pub extern "C" fn syncdock_long_version() -> *mut c_char {
    guarded_string(|| Controller::global().long_version())
}

/// Release a string returned by this library. Null is ignored.
///
/// # Safety
///
/// `s` is null or a pointer obtained from this library that has not been
/// freed yet.
#[no_mangle]
pub unsafe extern "C" fn syncdock_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_argument_is_empty() {
        assert_eq!(unsafe { arg_string(ptr::null()) }, "");
    }

    #[test]
    fn invalid_utf8_argument_is_empty() {
        let bytes = b"\xff\xfe\0";
        assert_eq!(unsafe { arg_string(bytes.as_ptr().cast()) }, "");
    }

    #[test]
    fn valid_argument_is_copied() {
        let s = CString::new("/srv/sync").unwrap();
        assert_eq!(unsafe { arg_string(s.as_ptr()) }, "/srv/sync");
    }

    #[test]
    fn panics_become_internal_error() {
        assert_eq!(
            guarded(|| panic!("boom")),
            ExitCode::InternalError.as_i32()
        );
        assert!(guarded_string(|| panic!("boom")).is_null());
    }

    #[test]
    fn strings_round_trip_through_free() {
        let s = guarded_string(|| "v1".to_owned());
        assert!(!s.is_null());
        unsafe {
            assert_eq!(CStr::from_ptr(s).to_str().unwrap(), "v1");
            syncdock_free_string(s);
            syncdock_free_string(ptr::null_mut());
        }
    }
}
