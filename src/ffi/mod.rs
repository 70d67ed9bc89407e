//! C ABI for hosts that embed the engine as a static or dynamic library.
//!
//! Handles are heap pointers created by `*_open`/`*_new` and released by the
//! matching `*_close`. Every entry point null-checks its arguments and
//! returns a neutral value instead of crashing.

use std::ffi::{c_char, CStr};
use std::path::Path;

pub mod classify;
pub mod recognizer;


pub use classify::*;
pub use recognizer::*;

/// Move `value` to the heap and hand the pointer to C. Release it with
/// [`owned_drop`].
pub(crate) fn owned_new<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

/// Free a value created by [`owned_new`]. No-op on null.
///
/// # Safety
/// `ptr` must come from [`owned_new`] and must not have been freed already.
pub(crate) unsafe fn owned_drop<T>(ptr: *mut T) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

/// `None` for a null pointer or invalid UTF-8.
pub(crate) unsafe fn cptr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Validate FFI arguments and bind them as safe values, returning `$on_err`
/// from the calling function when a check fails.
///
/// | Syntax | Effect |
/// |--------|--------|
/// | `str: $name = $ptr` | null-check a `*const c_char`, bind `&str` |
/// | `ref: $name = $ptr` | null-check a `*const T`, bind `&T` |
/// | `mut: $name = $ptr` | null-check a `*mut T`, bind `&mut T` |
macro_rules! ffi_guard {
    ($on_err:expr ; ) => {};

    ($on_err:expr ; str: $name:ident = $ptr:expr , $($rest:tt)*) => {
        let Some($name) = (unsafe { $crate::ffi::cptr_to_str($ptr) }) else {
            return $on_err;
        };
        $crate::ffi::ffi_guard!($on_err ; $($rest)*);
    };

    ($on_err:expr ; ref: $name:ident = $ptr:expr , $($rest:tt)*) => {
        if $ptr.is_null() {
            return $on_err;
        }
        let $name = unsafe { &*$ptr };
        $crate::ffi::ffi_guard!($on_err ; $($rest)*);
    };

    ($on_err:expr ; mut: $name:ident = $ptr:expr , $($rest:tt)*) => {
        if $ptr.is_null() {
            return $on_err;
        }
        let $name = unsafe { &mut *$ptr };
        $crate::ffi::ffi_guard!($on_err ; $($rest)*);
    };
}

/// Define an `extern "C"` function freeing a handle of type `$T`.
macro_rules! ffi_close {
    ($fn_name:ident, $T:ty) => {
        #[no_mangle]
        pub extern "C" fn $fn_name(ptr: *mut $T) {
            unsafe { $crate::ffi::owned_drop(ptr) };
        }
    };
}

pub(crate) use ffi_close;
pub(crate) use ffi_guard;

#[no_mangle]
pub extern "C" fn recline_engine_version() -> *const c_char {
    c"0.1.0".as_ptr()
}

#[no_mangle]
#[allow(clippy::unused_unit)]
pub extern "C" fn recline_trace_init(log_dir: *const c_char) {
    ffi_guard!(();
        str: dir_str = log_dir,
    );
    crate::trace_init::init_tracing(Path::new(dir_str));
}

/// Install custom settings TOML. Must run before any handle is opened.
/// Returns `false` when the TOML is invalid or settings are already fixed.
#[no_mangle]
pub extern "C" fn recline_settings_init(toml: *const c_char) -> bool {
    ffi_guard!(false;
        str: toml_str = toml,
    );
    match crate::settings::init_custom(toml_str.to_owned()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "custom settings rejected");
            false
        }
    }
}
