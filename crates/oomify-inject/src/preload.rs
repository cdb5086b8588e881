//! Removing this library from the target's `LD_PRELOAD`.
//!
//! The controller puts the library first in the list. Once it is loaded the
//! target's children must not inherit it, but any entries the user had set
//! themselves should survive.

#![cfg_attr(test, allow(dead_code))]

use std::ffi::{c_char, CStr};
use std::ptr;

pub(crate) const PRELOAD_KEY: &CStr = c"LD_PRELOAD";

fn is_separator(byte: u8) -> bool {
    byte == b':' || byte == b' '
}

/// Offset of the first entry after the leading one, or `None` if the
/// leading entry is the only one.
pub(crate) fn remainder_start(value: &[u8]) -> Option<usize> {
    let end = value.iter().position(|b| is_separator(*b))?;
    let start = end + value[end..].iter().position(|b| !is_separator(*b))?;
    Some(start)
}

/// Drop the leading `LD_PRELOAD` entry from this process's environment.
///
/// The environment string is rewritten in place, so no allocation happens.
///
/// # Safety
///
/// Must run while no other thread reads or writes the environment, i.e.
/// from the library constructor.
pub(crate) unsafe fn strip_own_entry() {
    let value: *mut c_char = libc::getenv(PRELOAD_KEY.as_ptr());
    if value.is_null() {
        return;
    }

    let bytes = CStr::from_ptr(value).to_bytes();
    match remainder_start(bytes) {
        Some(start) => {
            // Shift the rest of the list, including its terminator, to the front.
            ptr::copy(value.add(start), value, bytes.len() - start + 1);
        }
        None => {
            libc::unsetenv(PRELOAD_KEY.as_ptr());
        }
    }
}
