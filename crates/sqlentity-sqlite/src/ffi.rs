//! Thin layer over the `libsqlite3-sys` bindings.
//!
//! The raw bindings are re-exported unchanged; only the few helpers that
//! turn C strings into Rust strings live here.

pub use libsqlite3_sys::*;

use std::ffi::{CStr, c_int};

// libsqlite3-sys omits `sqlite3_close_v2` from its generated bindings; the
// symbol is still present in the bundled amalgamation.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// English description of a result code.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a pointer to a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        if ptr.is_null() {
            "unknown error"
        } else {
            CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
        }
    }
}

/// Version string of the linked SQLite library.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a pointer to a static string
    unsafe {
        CStr::from_ptr(sqlite3_libversion())
            .to_str()
            .unwrap_or("unknown")
    }
}

/// Version number of the linked SQLite library (e.g. 3045001).
pub fn version_number() -> i32 {
    // SAFETY: no preconditions
    unsafe { sqlite3_libversion_number() }
}
