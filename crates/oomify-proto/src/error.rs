//! Error types for record decoding.

use thiserror::Error;

/// Errors that can occur while decoding a wire record
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record has {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("flag byte at offset {offset} is {value:#04x}, expected 0 or 1")]
    InvalidFlag { offset: usize, value: u8 },
}
