//! The interposed allocation entry points.

use libc::{c_int, c_void, size_t, EINVAL, ENOMEM};
use oomify_proto::{AllocKind, Decision};

use crate::injector::Injector;
use crate::{diag, real};

/// The one injector of this process.
pub(crate) static INJECTOR: Injector = Injector::new();

/// Count a fallible call and report whether it must fail.
#[inline]
fn should_fail(kind: AllocKind) -> bool {
    match INJECTOR.intercept(kind) {
        (_, Decision::Allow) => false,
        (_, Decision::Fail) => true,
        (index, Decision::FailAndPause) => {
            diag::pause(index);
            true
        }
    }
}

fn errno() -> c_int {
    // SAFETY: the errno location is valid for the calling thread.
    unsafe { *libc::__errno_location() }
}

fn set_errno(value: c_int) {
    // SAFETY: the errno location is valid for the calling thread.
    unsafe { *libc::__errno_location() = value }
}

/// What a pointer-returning allocator yields when memory runs out.
fn out_of_memory() -> *mut c_void {
    set_errno(ENOMEM);
    std::ptr::null_mut()
}

fn valid_posix_alignment(align: size_t) -> bool {
    align.is_power_of_two() && align % std::mem::size_of::<*mut c_void>() == 0
}

#[no_mangle]
pub unsafe extern "C" fn malloc(size: size_t) -> *mut c_void {
    if should_fail(AllocKind::Malloc) {
        return out_of_memory();
    }
    real::malloc(size)
}

#[no_mangle]
pub unsafe extern "C" fn calloc(nmemb: size_t, size: size_t) -> *mut c_void {
    if should_fail(AllocKind::Calloc) {
        return out_of_memory();
    }
    real::calloc(nmemb, size)
}

#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void {
    let kind = if ptr.is_null() {
        AllocKind::ReallocNull
    } else {
        AllocKind::Realloc
    };
    // A failed realloc leaves the original block untouched.
    if should_fail(kind) {
        return out_of_memory();
    }
    real::realloc(ptr, size)
}

#[no_mangle]
pub unsafe extern "C" fn aligned_alloc(align: size_t, size: size_t) -> *mut c_void {
    if should_fail(AllocKind::AlignedAlloc) {
        return out_of_memory();
    }
    real::memalign(align, size)
}

#[no_mangle]
pub unsafe extern "C" fn memalign(align: size_t, size: size_t) -> *mut c_void {
    if should_fail(AllocKind::Memalign) {
        return out_of_memory();
    }
    real::memalign(align, size)
}

/// Unlike the other entry points, `posix_memalign()` reports failure through
/// its return value and leaves `errno` alone, including when a pause
/// diagnostic could not be written.
#[no_mangle]
pub unsafe extern "C" fn posix_memalign(
    memptr: *mut *mut c_void,
    align: size_t,
    size: size_t,
) -> c_int {
    let saved = errno();
    let fail = should_fail(AllocKind::PosixMemalign);
    set_errno(saved);
    if fail {
        return ENOMEM;
    }
    if !valid_posix_alignment(align) {
        return EINVAL;
    }

    set_errno(0);
    let ptr = real::memalign(align, size);
    let error = errno();
    set_errno(saved);

    if !ptr.is_null() {
        *memptr = ptr;
        0
    } else if error != 0 {
        error
    } else {
        ENOMEM
    }
}

#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    INJECTOR.record_free(ptr.is_null());
    real::free(ptr)
}
