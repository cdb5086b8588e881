//! Allocation-free diagnostics for the target's stderr.

#![cfg_attr(test, allow(dead_code))]

const PREFIX: &[u8] = b"liboomify: ";

fn emit(parts: &[&[u8]]) {
    for part in parts {
        // Best effort: there is nowhere to report a failing stderr.
        let _ = crate::channel::write_full(libc::STDERR_FILENO, part);
    }
}

/// Report an integrity violation and abort the target.
pub(crate) fn fatal(message: &[u8]) -> ! {
    emit(&[PREFIX, message, b"\n"]);
    // SAFETY: abort() has no preconditions.
    unsafe { libc::abort() }
}

/// Stop the whole process at the first injected failure so a debugger can
/// attach. Returns once the process has been continued.
pub(crate) fn pause(index: u64) {
    // SAFETY: getpid() and raise() have no preconditions.
    let pid = unsafe { libc::getpid() };

    let mut pid_buf = [0u8; 20];
    let mut index_buf = [0u8; 20];
    emit(&[
        PREFIX,
        b"pid ",
        format_u64(pid as u64, &mut pid_buf),
        b" stopping at allocation ",
        format_u64(index, &mut index_buf),
        b"\n",
    ]);

    unsafe { libc::raise(libc::SIGSTOP) };
}

/// Decimal rendering of `value` into `buf`.
pub(crate) fn format_u64(mut value: u64, buf: &mut [u8; 20]) -> &[u8] {
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &buf[start..]
}
