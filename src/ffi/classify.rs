use std::ffi::c_char;
use std::ptr;

use super::{ffi_close, ffi_guard, owned_new};
use crate::classify::Classifications;

#[no_mangle]
pub extern "C" fn recline_classifications_new(line_len: u32) -> *mut Classifications {
    owned_new(Classifications::new(line_len as usize))
}

ffi_close!(recline_classifications_close, Classifications);

/// Add one command from parallel `starts`/`lens` arrays of `count` words.
/// Returns the index of its first word, or `u32::MAX` on bad arguments.
#[no_mangle]
pub extern "C" fn recline_classifications_add_command(
    classifications: *mut Classifications,
    starts: *const u32,
    lens: *const u32,
    count: u32,
) -> u32 {
    ffi_guard!(u32::MAX;
        mut: c = classifications,
    );
    let words: Vec<_> = if count == 0 {
        Vec::new()
    } else {
        if starts.is_null() || lens.is_null() {
            return u32::MAX;
        }
        // SAFETY: the caller passes two arrays of `count` elements.
        let (starts, lens) = unsafe {
            (
                std::slice::from_raw_parts(starts, count as usize),
                std::slice::from_raw_parts(lens, count as usize),
            )
        };
        starts
            .iter()
            .zip(lens)
            .map(|(&s, &l)| s as usize..(s as usize).saturating_add(l as usize))
            .collect()
    };
    u32::try_from(c.add_command(&words)).unwrap_or(u32::MAX)
}

/// Classify word `index` from a script code (`"c"`, `"ma"`, ...). Returns
/// `false` when the index is out of bounds.
#[no_mangle]
pub extern "C" fn recline_classifications_classify(
    classifications: *mut Classifications,
    index: u32,
    code: *const c_char,
    overwrite: bool,
) -> bool {
    ffi_guard!(false;
        mut: c = classifications,
        str: code_str = code,
    );
    c.classify_code(index as usize, code_str, overwrite).is_ok()
}

#[no_mangle]
pub extern "C" fn recline_classifications_apply_face(
    classifications: *mut Classifications,
    start: u32,
    len: u32,
    face: u8,
    overwrite: bool,
) {
    ffi_guard!(();
        mut: c = classifications,
    );
    c.apply_face(start as usize, len as usize, face, overwrite);
}

/// Finish and expose the face bytes. The pointer stays valid until the next
/// mutating call or `recline_classifications_close`.
#[no_mangle]
pub extern "C" fn recline_classifications_finish(
    classifications: *mut Classifications,
    show_argmatchers: bool,
    out_len: *mut u32,
) -> *const u8 {
    ffi_guard!(ptr::null();
        mut: c = classifications,
    );
    c.finish(show_argmatchers);
    let faces = c.faces();
    if !out_len.is_null() {
        // SAFETY: checked non-null; the caller owns the slot.
        unsafe { *out_len = faces.len() as u32 };
    }
    faces.as_ptr()
}
