use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use syncdock_core::Severity;

/// Host log receiver: severity, message bytes, byte count.
///
/// The bytes are not NUL-terminated and are only valid until the callback
/// returns.
pub type LogCallback = extern "C" fn(severity: c_int, message: *const c_char, len: usize);

static CALLBACK: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

pub(crate) fn set(callback: Option<LogCallback>) {
    let raw = callback.map_or(ptr::null_mut(), |f| f as *mut ());
    CALLBACK.store(raw, Ordering::SeqCst);
}

fn current() -> Option<LogCallback> {
    let raw = CALLBACK.load(Ordering::SeqCst);
    if raw.is_null() {
        return None;
    }
    // SAFETY: only `set` writes the slot, and it stores null or a LogCallback.
    Some(unsafe { std::mem::transmute::<*mut (), LogCallback>(raw) })
}

/// Log sink handed to the bridge.
pub(crate) fn forward(severity: Severity, message: &[u8]) {
    if let Some(callback) = current() {
        callback(severity.as_i32(), message.as_ptr().cast(), message.len());
    }
}
