//! Controller side of oomify: run a target with the interception library
//! preloaded, feed it a control record, and collect how it ended.

#![cfg(target_os = "linux")]

pub mod config;
pub mod controller;
pub mod error;
pub mod sweep;

pub use config::ControllerConfig;
pub use controller::{merge_preload, Controller, RunReport, Statistics, Target, Termination};
pub use error::Error;
pub use sweep::{
    InjectionRun, Sweep, SweepObserver, SweepOptions, SweepPlan, SweepReport, TargetRunner,
};

pub use oomify_proto::{AllocKind, Control, Stats};

pub type Result<T> = std::result::Result<T, error::Error>;
