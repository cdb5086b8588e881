//! Allocation interposer loaded into the target through `LD_PRELOAD`.
//!
//! At load time the library reads a [`Control`](oomify_proto::Control) record
//! from [`CONTROL_FD`](oomify_proto::CONTROL_FD). From then on every fallible
//! allocation call draws the next index from a shared counter and either
//! reaches the real allocator or fails with `ENOMEM`. At exit the final
//! counters are written to [`STATS_FD`](oomify_proto::STATS_FD).
//!
//! Nothing in here may allocate: every path runs inside `malloc()`.

#![cfg(target_os = "linux")]

mod channel;
mod counters;
mod diag;
mod injector;
mod preload;

// The test harness must keep the system allocator, so the exported symbols
// and load hooks only exist in the real library.
#[cfg(not(test))]
mod hooks;
#[cfg(not(test))]
mod lifecycle;
#[cfg(not(test))]
mod real;
