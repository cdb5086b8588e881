//! Load and unload of the interception library when its channels are
//! missing or carry garbage. The fixture is started by a shell so that only
//! the fixture, not the shell, gets the library preloaded.

mod common;

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

use oomify_core::Control;

use common::{library, FIXTURE};

/// Run the fixture's `baseline` mode with `redirects` applied to it.
/// `$3` names a file holding `record`, when there is one.
fn run_fixture(redirects: &str, record: Option<&[u8]>) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let record_path = dir.path().join("control");
    if let Some(bytes) = record {
        std::fs::write(&record_path, bytes).unwrap();
    }

    let script = format!("LD_PRELOAD=\"$2\" exec \"$1\" baseline {redirects}");
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .arg("sh")
        .arg(FIXTURE)
        .arg(library())
        .arg(&record_path)
        .env_remove("LD_PRELOAD")
        .output()
        .unwrap()
}

fn assert_aborted_with(output: &Output, message: &str) {
    assert_eq!(
        output.status.signal(),
        Some(libc::SIGABRT),
        "unexpected status {:?}",
        output.status
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(&format!("liboomify: {message}\n")),
        "unexpected stderr {stderr:?}"
    );
}

#[test]
fn test_missing_control_channel_aborts() {
    let output = run_fixture("3<&- 4>/dev/null", None);
    assert_aborted_with(&output, "Failed to read oomctl");
}

#[test]
fn test_short_control_record_aborts() {
    let output = run_fixture("3<\"$3\" 4>/dev/null", Some(&[0u8; 4]));
    assert_aborted_with(&output, "Failed to read oomctl");
}

#[test]
fn test_malformed_control_record_aborts() {
    let mut record = Control::counting().encode();
    record[Control::ENCODED_LEN - 1] = 2;

    let output = run_fixture("3<\"$3\" 4>/dev/null", Some(&record));
    assert_aborted_with(&output, "Malformed oomctl");
}

#[test]
fn test_missing_stats_channel_aborts_at_exit() {
    let output = run_fixture("3<\"$3\" 4>&-", Some(&Control::counting().encode()));
    assert_aborted_with(&output, "Failed to write oomstat");
}

#[test]
fn test_valid_channels_exit_cleanly() {
    let output = run_fixture("3<\"$3\" 4>/dev/null", Some(&Control::counting().encode()));
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert!(output.stderr.is_empty(), "{output:?}");
}
