use std::ffi::c_char;

use super::{ffi_close, ffi_guard, owned_new};
use crate::recognizer::{Recognition, Recognizer};
use crate::settings::settings;

/// Returned by `recline_recognizer_find` when the word has no entry.
pub const RECLINE_NOT_CACHED: i8 = i8::MIN;

/// Recognizer resolving against `PATH` with the global settings.
#[no_mangle]
pub extern "C" fn recline_recognizer_open() -> *mut Recognizer {
    owned_new(Recognizer::with_path_resolver(&settings().recognizer))
}

// Dropping the recognizer shuts the worker down and joins it.
ffi_close!(recline_recognizer_close, Recognizer);

/// Per-keystroke lookup; queues the word when it has no final result.
/// Returns a [`Recognition::code`].
#[no_mangle]
pub extern "C" fn recline_recognize(recognizer: *const Recognizer, word: *const c_char) -> i8 {
    ffi_guard!(Recognition::NotRecognized.code();
        ref: r = recognizer,
        str: word_str = word,
    );
    r.recognize(word_str).code()
}

/// Cache lookup by normalized key without queuing anything.
#[no_mangle]
pub extern "C" fn recline_recognizer_find(recognizer: *const Recognizer, key: *const c_char) -> i8 {
    ffi_guard!(RECLINE_NOT_CACHED;
        ref: r = recognizer,
        str: key_str = key,
    );
    r.find(key_str).map_or(RECLINE_NOT_CACHED, Recognition::code)
}

#[no_mangle]
pub extern "C" fn recline_recognizer_clear(recognizer: *const Recognizer) {
    ffi_guard!(();
        ref: r = recognizer,
    );
    r.clear();
}

/// Bounded end-of-line wait. `timeout_ms == 0` uses the configured bound.
#[no_mangle]
pub extern "C" fn recline_recognizer_wait(recognizer: *const Recognizer, timeout_ms: u32) -> bool {
    ffi_guard!(false;
        ref: r = recognizer,
    );
    let timeout = if timeout_ms == 0 {
        settings().recognizer.end_of_line_wait()
    } else {
        std::time::Duration::from_millis(u64::from(timeout_ms))
    };
    r.wait_until_idle(timeout)
}
