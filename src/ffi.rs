//! FFI bindings for Dayscope
//!
//! C-compatible entry points for embedding the engine in host applications.
//! All functions use C strings (null-terminated) and return allocated memory
//! that must be freed by the caller using `dayscope_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::pipeline::process_day_json;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Process one day-batch JSON document and return the result-bundle JSON.
///
/// # Safety
/// - `batch_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with
///   `dayscope_free_string`.
/// - Returns NULL on error; call `dayscope_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn dayscope_process_day(batch_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(batch_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid batch JSON pointer");
            return ptr::null_mut();
        }
    };

    match process_day_json(&json) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return the last error message, or NULL if the last call succeeded.
///
/// # Safety
/// The returned pointer is owned by thread-local storage and must NOT be
/// freed; it is invalidated by the next engine call on this thread.
#[no_mangle]
pub unsafe extern "C" fn dayscope_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string previously returned by this library.
///
/// # Safety
/// `s` must be a pointer returned by `dayscope_process_day` (or NULL, which
/// is a no-op). Passing any other pointer is undefined behavior.
#[no_mangle]
pub unsafe extern "C" fn dayscope_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Return the engine version as a newly allocated string.
///
/// # Safety
/// The returned string must be freed with `dayscope_free_string`.
#[no_mangle]
pub unsafe extern "C" fn dayscope_version() -> *mut c_char {
    string_to_cstr(crate::ENGINE_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_day_round_trip() {
        let json = CString::new(
            r#"{"date":"2024-01-15","events":[{"package_name":"","event_kind":"user_unlocked","timestamp_millis":1705276800000,"date_string":"2024-01-15"}]}"#,
        )
        .unwrap();

        unsafe {
            let out = dayscope_process_day(json.as_ptr());
            assert!(!out.is_null());
            let result = CStr::from_ptr(out).to_str().unwrap();
            assert!(result.contains("\"date_string\":\"2024-01-15\""));
            dayscope_free_string(out);
        }
    }

    #[test]
    fn test_error_path_sets_last_error() {
        let json = CString::new("not json").unwrap();

        unsafe {
            let out = dayscope_process_day(json.as_ptr());
            assert!(out.is_null());
            let err = dayscope_last_error();
            assert!(!err.is_null());
        }
    }

    #[test]
    fn test_null_pointer_rejected() {
        unsafe {
            let out = dayscope_process_day(ptr::null());
            assert!(out.is_null());
        }
    }
}
