//! Process-wide injection state: the loaded control record and the counters.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use oomify_proto::{AllocKind, Control, Decision, Stats};

use crate::counters::Counters;

/// Everything the hooks consult on each call.
///
/// Until [`Injector::configure`] runs, the injector is in counting mode, so
/// allocations made by the loader or by earlier constructors are counted but
/// never failed.
pub(crate) struct Injector {
    counters: Counters,
    inject_at: AtomicU64,
    inject_after: AtomicBool,
    stop: AtomicBool,
    /// Pid of the process that loaded the control record.
    owner: AtomicI32,
}

impl Injector {
    pub(crate) const fn new() -> Self {
        Self {
            counters: Counters::new(),
            inject_at: AtomicU64::new(Control::NO_INJECTION),
            inject_after: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            owner: AtomicI32::new(0),
        }
    }

    pub(crate) fn configure(&self, control: Control) {
        self.inject_after.store(control.inject_after, Ordering::Relaxed);
        self.stop.store(control.stop, Ordering::Relaxed);
        self.inject_at.store(control.inject_at, Ordering::Release);
    }

    pub(crate) fn control(&self) -> Control {
        let inject_at = self.inject_at.load(Ordering::Acquire);
        Control {
            inject_at,
            inject_after: self.inject_after.load(Ordering::Relaxed),
            stop: self.stop.load(Ordering::Relaxed),
        }
    }

    /// Count one fallible call and decide its outcome.
    pub(crate) fn intercept(&self, kind: AllocKind) -> (u64, Decision) {
        let index = self.counters.record(kind);
        (index, self.control().decide(index))
    }

    pub(crate) fn record_free(&self, ptr_is_null: bool) {
        self.counters.record_free(ptr_is_null);
    }

    pub(crate) fn claim(&self, pid: i32) {
        self.owner.store(pid, Ordering::Relaxed);
    }

    /// Whether `pid` is the process that loaded the control record, as
    /// opposed to a `fork()`ed copy of it.
    pub(crate) fn owned_by(&self, pid: i32) -> bool {
        let owner = self.owner.load(Ordering::Relaxed);
        owner != 0 && owner == pid
    }

    pub(crate) fn snapshot(&self) -> Stats {
        self.counters.snapshot()
    }
}
