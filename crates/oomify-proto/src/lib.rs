//! Protocol definitions shared by the oomify controller and the preload library.
//!
//! The two processes exchange exactly two fixed-size records over inherited
//! pipes: a [`Control`] record from the controller to the target at startup,
//! and a [`Stats`] record from the target back to the controller at exit.
//! Both layouts are little-endian with no padding, so encoding and decoding
//! never allocate and can run inside the allocator hooks.

pub mod control;
pub mod error;
pub mod stats;

pub use control::{Control, Decision};
pub use error::DecodeError;
pub use stats::{AllocKind, Stats};

/// Descriptor number at which the target finds the read end of the control pipe.
pub const CONTROL_FD: i32 = 3;

/// Descriptor number at which the target finds the write end of the stats pipe.
pub const STATS_FD: i32 = 4;

/// Environment variable the dynamic loader consults for preloaded objects.
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

/// File name of the interception library produced by `oomify-inject`.
pub const LIBRARY_NAME: &str = "liboomify.so";

pub type Result<T> = std::result::Result<T, DecodeError>;

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(word)
}
