//! Human-readable progress lines on stderr.

use std::io::{self, Write};

use oomify_core::{AllocKind, InjectionRun, Stats, SweepObserver, SweepPlan, Termination};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

pub struct Reporter<W> {
    out: W,
    program: String,
    verbosity: Verbosity,
    plan: SweepPlan,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, program: String, verbosity: Verbosity, plan: SweepPlan) -> Self {
        let mut reporter = Self {
            out,
            program,
            verbosity,
            plan,
        };
        if matches!(plan, SweepPlan::Single(_)) {
            reporter.promote();
        }
        reporter
    }

    /// A sweep of exactly one run reports its exit too, unless quiet.
    fn promote(&mut self) {
        if self.verbosity == Verbosity::Normal {
            self.verbosity = Verbosity::Verbose;
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn write_discovery(&mut self, stats: &Stats) -> io::Result<()> {
        if self.verbosity != Verbosity::Quiet {
            writeln!(
                self.out,
                "oomify: {} did {} allocations",
                self.program, stats.total
            )?;
        }
        if self.verbosity == Verbosity::Verbose {
            for kind in AllocKind::ALL {
                writeln!(
                    self.out,
                    "\t{:<16}{}",
                    format!("{}:", kind.name()),
                    stats.count(kind)
                )?;
            }
            writeln!(self.out, "\t{:<16}{}", "free:", stats.free)?;
            writeln!(self.out, "\t{:<16}{}", "free(NULL):", stats.free_null)?;
            writeln!(self.out, "\t{:<16}{}", "leaked:", stats.outstanding())?;
        }
        Ok(())
    }

    fn write_run(&mut self, run: &InjectionRun) -> io::Result<()> {
        let show = match run.termination {
            Termination::Killed(_) => self.verbosity != Verbosity::Quiet,
            Termination::Exited(_) => self.verbosity == Verbosity::Verbose,
        };
        if show {
            writeln!(
                self.out,
                "oomify: alloc {}: {} {}",
                run.index, self.program, run.termination
            )?;
        }
        Ok(())
    }
}

impl<W: Write> SweepObserver for Reporter<W> {
    fn discovered(&mut self, stats: &Stats) {
        if let Err(e) = self.write_discovery(stats) {
            warn!("Failed to write the allocation summary: {}", e);
        }
        if self.plan == SweepPlan::Full && stats.total == 1 {
            self.promote();
        }
    }

    fn finished(&mut self, run: &InjectionRun) {
        if let Err(e) = self.write_run(run) {
            warn!(index = run.index, "Failed to write the run outcome: {}", e);
        }
    }
}
