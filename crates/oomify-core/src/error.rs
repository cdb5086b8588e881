//! Error types for the controller.

use std::ffi::OsString;
use std::io;

use thiserror::Error;

/// Errors that stop a controller run. How the target itself ended is never
/// one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot prepare the target environment: {0}")]
    Environment(String),

    #[error("Failed to create a channel: {0}")]
    Channel(#[source] nix::Error),

    #[error("Failed to spawn {program:?}: {source}")]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write the control record: {0}")]
    ControlWrite(#[source] io::Error),

    #[error("Short control record write: {written} of {expected} bytes")]
    ShortControlWrite { written: usize, expected: usize },

    #[error("Failed to wait for the target: {0}")]
    Wait(#[source] io::Error),

    #[error("Target did not report statistics: {0}")]
    MissingStatistics(#[source] io::Error),
}
