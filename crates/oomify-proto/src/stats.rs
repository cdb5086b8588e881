//! The statistics record written by the target at exit.

use serde::Serialize;

use crate::{read_u64, DecodeError, Result};

/// Allocation entry points whose calls can be failed.
///
/// The discriminants are the positions of the per-kind counters in the
/// [`Stats`] wire record, after `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum AllocKind {
    Malloc = 0,
    Calloc = 1,
    /// `realloc(NULL, n)`, which allocates a fresh block.
    ReallocNull = 2,
    /// `realloc(p, n)` on an existing block.
    Realloc = 3,
    AlignedAlloc = 4,
    PosixMemalign = 5,
    Memalign = 6,
}

impl AllocKind {
    pub const COUNT: usize = 7;

    pub const ALL: [AllocKind; Self::COUNT] = [
        AllocKind::Malloc,
        AllocKind::Calloc,
        AllocKind::ReallocNull,
        AllocKind::Realloc,
        AllocKind::AlignedAlloc,
        AllocKind::PosixMemalign,
        AllocKind::Memalign,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            AllocKind::Malloc => "malloc",
            AllocKind::Calloc => "calloc",
            AllocKind::ReallocNull => "realloc(NULL)",
            AllocKind::Realloc => "realloc",
            AllocKind::AlignedAlloc => "aligned_alloc",
            AllocKind::PosixMemalign => "posix_memalign",
            AllocKind::Memalign => "memalign",
        }
    }

    /// Whether a successful call hands out a new block rather than resizing one.
    pub const fn allocates_block(self) -> bool {
        !matches!(self, AllocKind::Realloc)
    }
}

/// Final allocation counters of one target run.
///
/// Wire order: `total`, the [`AllocKind`] counters in declaration order,
/// then `free` (non-null argument) and `free_null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Number of fallible allocation calls, i.e. the next injection index.
    pub total: u64,
    pub malloc: u64,
    pub calloc: u64,
    pub realloc_null: u64,
    pub realloc: u64,
    pub aligned_alloc: u64,
    pub posix_memalign: u64,
    pub memalign: u64,
    /// `free()` calls with a non-null pointer.
    pub free: u64,
    /// `free(NULL)` calls.
    pub free_null: u64,
}

impl Stats {
    /// Size of the encoded record in bytes.
    pub const ENCODED_LEN: usize = 8 * (AllocKind::COUNT + 3);

    pub const fn count(&self, kind: AllocKind) -> u64 {
        match kind {
            AllocKind::Malloc => self.malloc,
            AllocKind::Calloc => self.calloc,
            AllocKind::ReallocNull => self.realloc_null,
            AllocKind::Realloc => self.realloc,
            AllocKind::AlignedAlloc => self.aligned_alloc,
            AllocKind::PosixMemalign => self.posix_memalign,
            AllocKind::Memalign => self.memalign,
        }
    }

    /// Sum of every fallible counter. Matches `total` for any record the
    /// interception layer produces.
    pub fn fallible_sum(&self) -> u64 {
        AllocKind::ALL
            .iter()
            .fold(0u64, |sum, kind| sum.wrapping_add(self.count(*kind)))
    }

    /// Number of calls that handed out a new block (when they succeeded).
    pub fn blocks_allocated(&self) -> u64 {
        AllocKind::ALL
            .iter()
            .filter(|kind| kind.allocates_block())
            .fold(0u64, |sum, kind| sum.wrapping_add(self.count(*kind)))
    }

    /// Rough count of blocks still live at exit.
    pub fn outstanding(&self) -> u64 {
        self.blocks_allocated().saturating_sub(self.free)
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let fields = self.fields();
        let mut buf = [0u8; Self::ENCODED_LEN];
        for (chunk, value) in buf.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(DecodeError::Length {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }

        let field = |n: usize| read_u64(bytes, 8 * n);
        Ok(Self {
            total: field(0),
            malloc: field(1),
            calloc: field(2),
            realloc_null: field(3),
            realloc: field(4),
            aligned_alloc: field(5),
            posix_memalign: field(6),
            memalign: field(7),
            free: field(8),
            free_null: field(9),
        })
    }

    fn fields(&self) -> [u64; AllocKind::COUNT + 3] {
        [
            self.total,
            self.malloc,
            self.calloc,
            self.realloc_null,
            self.realloc,
            self.aligned_alloc,
            self.posix_memalign,
            self.memalign,
            self.free,
            self.free_null,
        ]
    }
}
