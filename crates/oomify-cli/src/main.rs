//! oomify: run a program once for every allocation it makes, failing that
//! allocation, and report the runs that crashed.

#![cfg(target_os = "linux")]

mod report;

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use oomify_core::{Controller, ControllerConfig, Sweep, SweepOptions, SweepPlan, Target};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use report::{Reporter, Verbosity};

/// Command line arguments for oomify
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fail every allocation in turn (the default)
    #[arg(short = 'a', long = "all", overrides_with = "nth")]
    all: bool,

    /// Fail only the NTH allocation, counting from 0
    #[arg(short = 'n', long = "nth", value_name = "NTH", overrides_with = "all")]
    nth: Option<u64>,

    /// Keep failing every allocation after the first injected failure
    #[arg(short = 'f', long = "inject-after")]
    inject_after: bool,

    /// Only count allocations, inject nothing
    #[arg(short = 'd', long = "dry-run")]
    dry_run: bool,

    /// Stop the target with SIGSTOP at the injected failure
    #[arg(short = 's', long = "stop")]
    stop: bool,

    /// Report every run and a per-call breakdown
    #[arg(short = 'v', long = "verbose", overrides_with = "quiet")]
    verbose: bool,

    /// Report nothing on stderr
    #[arg(short = 'q', long = "quiet", overrides_with = "verbose")]
    quiet: bool,

    /// Interception library to preload
    #[arg(long, value_name = "PATH", env = "OOMIFY_LIBRARY")]
    library: Option<PathBuf>,

    /// Print the sweep report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Program to run and its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true
    )]
    command: Vec<OsString>,
}

impl Args {
    fn plan(&self) -> SweepPlan {
        match (self.dry_run, self.nth) {
            (true, _) => SweepPlan::DryRun,
            (false, Some(index)) => SweepPlan::Single(index),
            (false, None) => SweepPlan::Full,
        }
    }

    fn options(&self) -> SweepOptions {
        SweepOptions {
            inject_after: self.inject_after,
            stop: self.stop,
        }
    }

    fn verbosity(&self) -> Verbosity {
        match (self.verbose, self.quiet) {
            (true, _) => Verbosity::Verbose,
            (false, true) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let target = Target::from_argv(args.command.clone()).context("No program to run")?;
    let controller = Controller::new(ControllerConfig::locate(args.library.clone()));
    let plan = args.plan();
    debug!(
        library = %controller.config().library.display(),
        ?plan,
        "Starting sweep"
    );

    let mut reporter = Reporter::new(
        std::io::stderr(),
        target.display_name(),
        args.verbosity(),
        plan,
    );
    let report = Sweep::new(&controller, &target, args.options())
        .run(plan, &mut reporter)
        .with_context(|| format!("Failed to run {}", target.display_name()))?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize the report")?;
        println!("{json}");
    }

    Ok(())
}
