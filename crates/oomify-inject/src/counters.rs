//! Lock-free allocation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use oomify_proto::{AllocKind, Stats};

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

/// One counter per allocation kind, plus the total that hands out injection indices.
pub(crate) struct Counters {
    total: AtomicU64,
    kinds: [AtomicU64; AllocKind::COUNT],
    free: AtomicU64,
    free_null: AtomicU64,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            total: ZERO,
            kinds: [ZERO; AllocKind::COUNT],
            free: ZERO,
            free_null: ZERO,
        }
    }

    /// Count one call of `kind` and return its injection index.
    ///
    /// The index is the value of `total` before this call's increment, so
    /// concurrent callers always receive distinct, gap-free indices.
    pub(crate) fn record(&self, kind: AllocKind) -> u64 {
        self.kinds[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn record_free(&self, ptr_is_null: bool) {
        let counter = if ptr_is_null {
            &self.free_null
        } else {
            &self.free
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let kind = |kind: AllocKind| self.kinds[kind.index()].load(Ordering::Relaxed);
        Stats {
            total: self.total.load(Ordering::SeqCst),
            malloc: kind(AllocKind::Malloc),
            calloc: kind(AllocKind::Calloc),
            realloc_null: kind(AllocKind::ReallocNull),
            realloc: kind(AllocKind::Realloc),
            aligned_alloc: kind(AllocKind::AlignedAlloc),
            posix_memalign: kind(AllocKind::PosixMemalign),
            memalign: kind(AllocKind::Memalign),
            free: self.free.load(Ordering::Relaxed),
            free_null: self.free_null.load(Ordering::Relaxed),
        }
    }
}
