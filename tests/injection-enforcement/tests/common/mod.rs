//! Shared setup for the end-to-end tests.
//!
//! The interception library is a cdylib, which cargo does not build for a
//! test package. An existing copy is used when there is one; otherwise it is
//! built once per test binary into its own target directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use oomify_core::{
    Control, Controller, ControllerConfig, Stats, Sweep, SweepOptions, SweepPlan, Target,
    Termination,
};

pub const FIXTURE: &str = env!("CARGO_BIN_EXE_alloc_pattern");

const LIBRARY_NAME: &str = "liboomify.so";

pub fn library() -> &'static Path {
    static LIBRARY: OnceLock<PathBuf> = OnceLock::new();
    LIBRARY.get_or_init(locate_or_build)
}

fn locate_or_build() -> PathBuf {
    if let Some(path) = std::env::var_os("OOMIFY_LIBRARY") {
        let path = PathBuf::from(path);
        assert!(path.is_file(), "OOMIFY_LIBRARY={} does not exist", path.display());
        return path;
    }

    let beside_fixture = PathBuf::from(FIXTURE).with_file_name(LIBRARY_NAME);
    if beside_fixture.is_file() {
        return beside_fixture;
    }

    // A separate target directory keeps this build off the lock of the one
    // that is running the tests.
    let target_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("oomify-inject");
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../Cargo.toml");
    let status = Command::new(env!("CARGO"))
        .args(["build", "--quiet", "-p", "oomify-inject", "--manifest-path"])
        .arg(&manifest)
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .expect("failed to run cargo");
    assert!(status.success(), "building oomify-inject failed: {status}");

    let built = target_dir.join("debug").join(LIBRARY_NAME);
    assert!(built.is_file(), "{} was not produced", built.display());
    built
}

pub fn controller() -> Controller {
    Controller::new(ControllerConfig::with_library(library()))
}

pub fn fixture(mode: &str) -> Target {
    Target::new(FIXTURE).arg(mode)
}

pub fn counted(controller: &Controller, mode: &str) -> Stats {
    let report = controller
        .run(&fixture(mode), Control::counting(), true)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(0));
    *report.stats.collected().expect("statistics were not delivered")
}

/// Index of the first of `calls` consecutive fixture calls that report
/// their own failure as exit status bit 0, 1, 2 and so on. Found by failing
/// each index in turn.
pub fn first_index_of(controller: &Controller, mode: &str, calls: u32) -> u64 {
    let target = fixture(mode);
    let report = Sweep::new(controller, &target, SweepOptions::default())
        .run(SweepPlan::Full, &mut ())
        .unwrap();

    let expected: Vec<Termination> = (0..calls).map(|bit| Termination::Exited(1 << bit)).collect();
    let terminations: Vec<Termination> = report.runs.iter().map(|run| run.termination).collect();
    let offset = terminations
        .windows(expected.len())
        .position(|window| window == expected.as_slice())
        .unwrap_or_else(|| panic!("{mode} calls not found in {terminations:?}"));
    report.runs[offset].index
}
