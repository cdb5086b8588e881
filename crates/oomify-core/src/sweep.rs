//! Driving the controller across a range of injection indices.

use oomify_proto::{Control, Stats};
use serde::Serialize;
use tracing::info;

use crate::controller::{Controller, RunReport, Statistics, Target, Termination};
use crate::error::Error;
use crate::Result;

/// Anything that can run a target once under a control record.
pub trait TargetRunner {
    fn run(&self, target: &Target, control: Control, want_stats: bool) -> Result<RunReport>;
}

impl TargetRunner for Controller {
    fn run(&self, target: &Target, control: Control, want_stats: bool) -> Result<RunReport> {
        Controller::run(self, target, control, want_stats)
    }
}

/// Which injection indices to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPlan {
    /// Fail one given index; no discovery run.
    Single(u64),
    /// Discover the allocation count, then fail each index in turn.
    Full,
    /// Only discover the allocation count.
    DryRun,
}

/// Flags applied to every injection run of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    pub inject_after: bool,
    pub stop: bool,
}

/// Outcome of the target with one index failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InjectionRun {
    pub index: u64,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub program: String,
    /// Counters of the discovery run, when one happened.
    pub discovery: Option<Stats>,
    pub runs: Vec<InjectionRun>,
}

impl SweepReport {
    /// Runs in which the target died from a signal.
    pub fn crashes(&self) -> impl Iterator<Item = &InjectionRun> {
        self.runs.iter().filter(|run| run.termination.is_killed())
    }
}

/// Progress callbacks, invoked as the sweep goes.
pub trait SweepObserver {
    fn discovered(&mut self, _stats: &Stats) {}

    fn finished(&mut self, _run: &InjectionRun) {}
}

impl SweepObserver for () {}

pub struct Sweep<'a, R> {
    runner: &'a R,
    target: &'a Target,
    options: SweepOptions,
}

impl<'a, R: TargetRunner> Sweep<'a, R> {
    pub fn new(runner: &'a R, target: &'a Target, options: SweepOptions) -> Self {
        Self {
            runner,
            target,
            options,
        }
    }

    /// Run the target without injecting anything and return its counters.
    pub fn discover(&self) -> Result<Stats> {
        let report = self.runner.run(self.target, Control::counting(), true)?;
        match report.stats {
            Statistics::Collected(stats) => Ok(stats),
            Statistics::Unavailable(e) => Err(Error::MissingStatistics(e)),
            Statistics::NotRequested => Err(Error::MissingStatistics(std::io::Error::other(
                "runner ignored the statistics request",
            ))),
        }
    }

    /// Fail a single index and report how the target ended.
    pub fn inject(&self, index: u64) -> Result<InjectionRun> {
        let control = Control::at(index)
            .with_inject_after(self.options.inject_after)
            .with_stop(self.options.stop);
        let report = self.runner.run(self.target, control, false)?;
        Ok(InjectionRun {
            index,
            termination: report.termination,
        })
    }

    /// Execute `plan`. A target that crashes is recorded and the sweep moves
    /// on; a controller error ends it.
    pub fn run(&self, plan: SweepPlan, observer: &mut impl SweepObserver) -> Result<SweepReport> {
        let mut report = SweepReport {
            program: self.target.display_name(),
            discovery: None,
            runs: Vec::new(),
        };

        let indices = match plan {
            SweepPlan::Single(index) => index..index.saturating_add(1),
            SweepPlan::Full | SweepPlan::DryRun => {
                let stats = self.discover()?;
                info!(
                    program = %report.program,
                    total = stats.total,
                    "Discovered allocation count"
                );
                observer.discovered(&stats);
                report.discovery = Some(stats);
                if plan == SweepPlan::DryRun {
                    0..0
                } else {
                    0..stats.total
                }
            }
        };

        for index in indices {
            let run = self.inject(index)?;
            observer.finished(&run);
            report.runs.push(run);
        }

        Ok(report)
    }
}
