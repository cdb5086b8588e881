//! The control record and the injection policy evaluated against it.

use crate::{read_u64, DecodeError, Result};

/// Configuration handed to the target once, before its own code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// Index of the allocation call to fail, or [`Control::NO_INJECTION`].
    pub inject_at: u64,
    /// Whether every call from `inject_at` onward fails as well.
    pub inject_after: bool,
    /// Whether the target stops itself at the first injected failure.
    pub stop: bool,
}

/// What the interception layer does with one fallible allocation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Delegate to the real allocator.
    Allow,
    /// Report an out-of-memory failure to the caller.
    Fail,
    /// Stop the process, then report an out-of-memory failure once resumed.
    FailAndPause,
}

impl Default for Control {
    fn default() -> Self {
        Self::counting()
    }
}

impl Control {
    /// Sentinel index that no allocation ever reaches.
    pub const NO_INJECTION: u64 = u64::MAX;

    /// Size of the encoded record in bytes.
    pub const ENCODED_LEN: usize = 10;

    /// Count allocations without failing any of them.
    pub const fn counting() -> Self {
        Self {
            inject_at: Self::NO_INJECTION,
            inject_after: false,
            stop: false,
        }
    }

    /// Fail the allocation call with the given index.
    pub const fn at(index: u64) -> Self {
        Self {
            inject_at: index,
            inject_after: false,
            stop: false,
        }
    }

    pub const fn with_inject_after(mut self, inject_after: bool) -> Self {
        self.inject_after = inject_after;
        self
    }

    pub const fn with_stop(mut self, stop: bool) -> Self {
        self.stop = stop;
        self
    }

    pub const fn is_counting(&self) -> bool {
        self.inject_at == Self::NO_INJECTION
    }

    /// Decide the fate of the call that drew `index` from the total counter.
    pub const fn decide(&self, index: u64) -> Decision {
        if index == self.inject_at {
            if self.stop {
                Decision::FailAndPause
            } else {
                Decision::Fail
            }
        } else if self.inject_after && index >= self.inject_at {
            Decision::Fail
        } else {
            Decision::Allow
        }
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..8].copy_from_slice(&self.inject_at.to_le_bytes());
        buf[8] = self.inject_after as u8;
        buf[9] = self.stop as u8;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(DecodeError::Length {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            inject_at: read_u64(bytes, 0),
            inject_after: decode_flag(bytes, 8)?,
            stop: decode_flag(bytes, 9)?,
        })
    }
}

fn decode_flag(bytes: &[u8], offset: usize) -> Result<bool> {
    match bytes[offset] {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(DecodeError::InvalidFlag { offset, value }),
    }
}
