//! Load and unload hooks: receive the control record, emit the stats record.

use oomify_proto::{Control, CONTROL_FD, STATS_FD};

use crate::hooks::INJECTOR;
use crate::{channel, diag, preload, real};

#[ctor::ctor]
fn load() {
    // SAFETY: constructors run before the target's own code, on one thread.
    unsafe {
        INJECTOR.claim(libc::getpid());

        let mut record = [0u8; Control::ENCODED_LEN];
        match channel::read_full(CONTROL_FD, &mut record) {
            Ok(n) if n == record.len() => {}
            _ => diag::fatal(b"Failed to read oomctl"),
        }
        let control = match Control::decode(&record) {
            Ok(control) => control,
            Err(_) => diag::fatal(b"Malformed oomctl"),
        };
        INJECTOR.configure(control);

        libc::close(CONTROL_FD);

        // Processes the target execs must neither inherit the stats pipe
        // nor load this library again.
        let flags = libc::fcntl(STATS_FD, libc::F_GETFD);
        if flags >= 0 && flags & libc::FD_CLOEXEC == 0 {
            libc::fcntl(STATS_FD, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
        preload::strip_own_entry();
    }
}

#[ctor::dtor]
fn unload() {
    // SAFETY: getpid() has no preconditions.
    if !INJECTOR.owned_by(unsafe { libc::getpid() }) {
        return;
    }

    // SAFETY: called once, at exit, after the target's own code finished.
    unsafe { real::release_runtime_state() };

    let record = INJECTOR.snapshot().encode();
    match channel::write_full(STATS_FD, &record) {
        Ok(n) if n == record.len() => {}
        _ => diag::fatal(b"Failed to write oomstat"),
    }
}
