//! The allocator underneath the hooks.
//!
//! glibc exports its implementation under `__libc_*` aliases, which can be
//! called without going back through the interposed symbols. Other C
//! runtimes are reached through `dlsym(RTLD_NEXT, ...)`.

pub(crate) use imp::*;

#[cfg(target_env = "gnu")]
mod imp {
    use libc::{c_void, size_t};

    extern "C" {
        fn __libc_malloc(size: size_t) -> *mut c_void;
        fn __libc_calloc(nmemb: size_t, size: size_t) -> *mut c_void;
        fn __libc_realloc(ptr: *mut c_void, size: size_t) -> *mut c_void;
        fn __libc_memalign(align: size_t, size: size_t) -> *mut c_void;
        fn __libc_free(ptr: *mut c_void);
        fn __libc_freeres();
    }

    pub(crate) unsafe fn malloc(size: size_t) -> *mut c_void {
        __libc_malloc(size)
    }

    pub(crate) unsafe fn calloc(nmemb: size_t, size: size_t) -> *mut c_void {
        __libc_calloc(nmemb, size)
    }

    pub(crate) unsafe fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void {
        __libc_realloc(ptr, size)
    }

    pub(crate) unsafe fn memalign(align: size_t, size: size_t) -> *mut c_void {
        __libc_memalign(align, size)
    }

    pub(crate) unsafe fn free(ptr: *mut c_void) {
        __libc_free(ptr)
    }

    /// Ask glibc to release its private allocations so they show up as frees.
    pub(crate) unsafe fn release_runtime_state() {
        __libc_freeres()
    }
}

#[cfg(not(target_env = "gnu"))]
mod imp {
    use std::ffi::CStr;
    use std::mem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use libc::{c_void, size_t};

    use crate::diag;

    /// A symbol looked up past this library in the load order.
    struct NextSymbol {
        name: &'static CStr,
        addr: AtomicUsize,
    }

    impl NextSymbol {
        const fn new(name: &'static CStr) -> Self {
            Self {
                name,
                addr: AtomicUsize::new(0),
            }
        }

        fn resolve(&self) -> usize {
            let cached = self.addr.load(Ordering::Acquire);
            if cached != 0 {
                return cached;
            }

            // SAFETY: `name` is NUL-terminated; RTLD_NEXT is a valid handle
            // from within a shared object.
            let addr = unsafe { libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr()) } as usize;
            if addr == 0 {
                diag::fatal(b"Failed to resolve the underlying allocator");
            }
            self.addr.store(addr, Ordering::Release);
            addr
        }
    }

    static MALLOC: NextSymbol = NextSymbol::new(c"malloc");
    static CALLOC: NextSymbol = NextSymbol::new(c"calloc");
    static REALLOC: NextSymbol = NextSymbol::new(c"realloc");
    static MEMALIGN: NextSymbol = NextSymbol::new(c"memalign");
    static FREE: NextSymbol = NextSymbol::new(c"free");

    pub(crate) unsafe fn malloc(size: size_t) -> *mut c_void {
        let f: unsafe extern "C" fn(size_t) -> *mut c_void = mem::transmute(MALLOC.resolve());
        f(size)
    }

    pub(crate) unsafe fn calloc(nmemb: size_t, size: size_t) -> *mut c_void {
        let f: unsafe extern "C" fn(size_t, size_t) -> *mut c_void =
            mem::transmute(CALLOC.resolve());
        f(nmemb, size)
    }

    pub(crate) unsafe fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void {
        let f: unsafe extern "C" fn(*mut c_void, size_t) -> *mut c_void =
            mem::transmute(REALLOC.resolve());
        f(ptr, size)
    }

    pub(crate) unsafe fn memalign(align: size_t, size: size_t) -> *mut c_void {
        let f: unsafe extern "C" fn(size_t, size_t) -> *mut c_void =
            mem::transmute(MEMALIGN.resolve());
        f(align, size)
    }

    pub(crate) unsafe fn free(ptr: *mut c_void) {
        let f: unsafe extern "C" fn(*mut c_void) = mem::transmute(FREE.resolve());
        f(ptr)
    }

    pub(crate) unsafe fn release_runtime_state() {}
}
