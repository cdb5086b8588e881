//! Spawning one target under one control record.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus};

use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use nix::unistd::pipe2;
use oomify_proto::{Control, Stats, CONTROL_FD, PRELOAD_ENV, STATS_FD};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::error::Error;
use crate::Result;

/// Program and arguments of the process under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Looked up in `PATH` when it contains no slash.
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Target {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a full argument vector into program and arguments.
    pub fn from_argv(argv: Vec<OsString>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// How the target process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Termination {
    Exited(i32),
    Killed(i32),
}

impl Termination {
    fn from_status(status: ExitStatus) -> Option<Self> {
        status
            .code()
            .map(Termination::Exited)
            .or_else(|| status.signal().map(Termination::Killed))
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Termination::Killed(_))
    }

    /// Symbolic name of the fatal signal, e.g. `SIGSEGV`.
    pub fn signal_name(&self) -> Option<&'static str> {
        match self {
            Termination::Killed(sig) => Signal::try_from(*sig).ok().map(Signal::as_str),
            Termination::Exited(_) => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {code}"),
            Termination::Killed(sig) => match self.signal_name() {
                Some(name) => write!(f, "terminated with signal {sig} ({name})"),
                None => write!(f, "terminated with signal {sig}"),
            },
        }
    }
}

/// The statistics outcome of one run.
#[derive(Debug)]
pub enum Statistics {
    NotRequested,
    Collected(Stats),
    /// The target ended without delivering a full record, e.g. because it
    /// was killed before its exit hooks ran.
    Unavailable(io::Error),
}

impl Statistics {
    pub fn collected(&self) -> Option<&Stats> {
        match self {
            Statistics::Collected(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Everything one controller run learned about the target.
#[derive(Debug)]
pub struct RunReport {
    pub pid: u32,
    pub termination: Termination,
    pub stats: Statistics,
}

/// Runs targets with the interception library preloaded.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    config: ControllerConfig,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run `target` once under `control`.
    ///
    /// Once the target has been spawned it is always waited for, whatever
    /// happens on the channels, and every descriptor is closed on return.
    pub fn run(&self, target: &Target, control: Control, want_stats: bool) -> Result<RunReport> {
        let preload = merge_preload(
            std::env::var_os(PRELOAD_ENV).as_deref(),
            &self.config.library,
        )?;

        let (control_rx, control_tx) = pipe2(OFlag::O_CLOEXEC).map_err(Error::Channel)?;
        let (stats_rx, stats_tx) = pipe2(OFlag::O_CLOEXEC).map_err(Error::Channel)?;

        let wiring = ChildWiring {
            control: control_rx.as_raw_fd(),
            stats: stats_tx.as_raw_fd(),
        };
        let mut command = Command::new(&target.program);
        command.args(&target.args).env(PRELOAD_ENV, &preload);
        // SAFETY: the hook only calls fcntl() and dup2(), which are
        // async-signal-safe, and touches no memory shared with the parent.
        unsafe {
            command.pre_exec(move || wiring.install());
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: target.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, program = ?target.program, ?control, "Spawned target");

        drop(control_rx);
        drop(stats_tx);

        let sent = send_control(File::from(control_tx), control);
        let mut stats_rx = File::from(stats_rx);
        let stats = match (&sent, want_stats) {
            (_, false) => Statistics::NotRequested,
            (Ok(()), true) => receive_stats(&mut stats_rx),
            (Err(_), true) => Statistics::Unavailable(io::Error::other(
                "control record was not delivered",
            )),
        };

        // The read end stays open until the target is reaped, so its exit
        // hook can always complete its write.
        let status = child.wait().map_err(Error::Wait)?;
        drop(stats_rx);
        sent?;

        let termination = Termination::from_status(status).ok_or_else(|| {
            Error::Wait(io::Error::other(format!("unexpected wait status {status}")))
        })?;
        debug!(pid, %termination, "Target finished");

        if let Statistics::Unavailable(e) = &stats {
            warn!(pid, "Statistics unavailable: {}", e);
        }

        Ok(RunReport {
            pid,
            termination,
            stats,
        })
    }
}

/// Write the control record in one `write()` and close the channel.
fn send_control(mut channel: File, control: Control) -> Result<()> {
    let record = control.encode();
    let written = channel.write(&record).map_err(Error::ControlWrite)?;
    if written != record.len() {
        return Err(Error::ShortControlWrite {
            written,
            expected: record.len(),
        });
    }
    Ok(())
}

fn receive_stats(channel: &mut File) -> Statistics {
    let mut record = [0u8; Stats::ENCODED_LEN];
    match channel.read_exact(&mut record) {
        Ok(()) => match Stats::decode(&record) {
            Ok(stats) => Statistics::Collected(stats),
            Err(e) => Statistics::Unavailable(io::Error::new(io::ErrorKind::InvalidData, e)),
        },
        Err(e) => Statistics::Unavailable(e),
    }
}

/// Parent-side descriptor numbers that become the child's channel ends.
#[derive(Clone, Copy)]
struct ChildWiring {
    control: RawFd,
    stats: RawFd,
}

impl ChildWiring {
    /// Runs in the forked child, before exec.
    fn install(&self) -> io::Result<()> {
        let control = lift_above_reserved(self.control)?;
        let stats = lift_above_reserved(self.stats)?;
        // dup2() onto a different number yields a descriptor without
        // FD_CLOEXEC; the O_CLOEXEC sources disappear at exec.
        dup_onto(control, CONTROL_FD)?;
        dup_onto(stats, STATS_FD)?;
        Ok(())
    }
}

/// Move `fd` out of the range the channels are placed at, so that placing
/// one channel cannot close the other.
fn lift_above_reserved(fd: RawFd) -> io::Result<RawFd> {
    let reserved = CONTROL_FD.max(STATS_FD);
    if fd > reserved {
        return Ok(fd);
    }
    // SAFETY: plain descriptor duplication.
    let lifted = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, reserved + 1) };
    if lifted < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(lifted)
}

fn dup_onto(fd: RawFd, target: RawFd) -> io::Result<()> {
    // SAFETY: plain descriptor duplication.
    if unsafe { libc::dup2(fd, target) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Build the child's `LD_PRELOAD`: `library` first, then whatever the
/// parent already preloads.
pub fn merge_preload(existing: Option<&OsStr>, library: &Path) -> Result<OsString> {
    let lib = library.as_os_str().as_bytes();
    if lib.is_empty() {
        return Err(Error::Environment(
            "interception library path is empty".to_string(),
        ));
    }
    if lib.iter().any(|b| matches!(b, b':' | b' ' | b'\t')) {
        return Err(Error::Environment(format!(
            "interception library path {} cannot be listed in {}",
            library.display(),
            PRELOAD_ENV
        )));
    }

    let mut merged = lib.to_vec();
    if let Some(existing) = existing.filter(|v| !v.is_empty()) {
        merged.push(b':');
        merged.extend_from_slice(existing.as_bytes());
    }
    Ok(OsString::from_vec(merged))
}
