//! End-to-end runs of the `alloc_pattern` fixture under the real
//! interception library: counting and failing each entry point.

mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{getpid, Pid};
use oomify_core::{Control, Termination};

use common::{controller, counted, first_index_of, fixture};

const PATTERN_CALLS: u32 = 5;
const KINDS_CALLS: u32 = 7;
const POSIX_MEMALIGN_CALL: u64 = 6;

#[test]
fn test_counting_run_sees_the_pattern() {
    let controller = controller();

    let baseline = counted(&controller, "baseline");
    let pattern = counted(&controller, "pattern");

    assert_eq!(baseline.total, baseline.fallible_sum());
    assert_eq!(pattern.total, pattern.fallible_sum());

    assert_eq!(pattern.total - baseline.total, 5);
    assert_eq!(pattern.malloc - baseline.malloc, 5);
    assert_eq!(pattern.calloc, baseline.calloc);
    assert_eq!(pattern.free - baseline.free, 2);
    assert_eq!(pattern.free_null - baseline.free_null, 1);
}

#[test]
fn test_counting_run_sees_every_kind() {
    let controller = controller();

    let baseline = counted(&controller, "baseline");
    let kinds = counted(&controller, "kinds");

    assert_eq!(kinds.total, kinds.fallible_sum());
    assert_eq!(kinds.total - baseline.total, 7);
    assert_eq!(kinds.malloc - baseline.malloc, 1);
    assert_eq!(kinds.calloc - baseline.calloc, 1);
    assert_eq!(kinds.realloc_null - baseline.realloc_null, 1);
    assert_eq!(kinds.realloc - baseline.realloc, 1);
    assert_eq!(kinds.aligned_alloc - baseline.aligned_alloc, 1);
    assert_eq!(kinds.memalign - baseline.memalign, 1);
    assert_eq!(kinds.posix_memalign - baseline.posix_memalign, 1);
    assert_eq!(kinds.free - baseline.free, 6);
    assert_eq!(kinds.free_null, baseline.free_null);
}

#[test]
fn test_counting_runs_are_deterministic() {
    let controller = controller();

    assert_eq!(
        counted(&controller, "pattern"),
        counted(&controller, "pattern")
    );
}

#[test]
fn test_single_failure_and_inject_after() {
    let controller = controller();

    let start = first_index_of(&controller, "pattern", PATTERN_CALLS);
    let target = fixture("pattern");

    let third = controller
        .run(&target, Control::at(start + 2), false)
        .unwrap();
    assert_eq!(third.termination, Termination::Exited(4));

    let sticky = controller
        .run(&target, Control::at(start + 2).with_inject_after(true), false)
        .unwrap();
    assert_eq!(sticky.termination, Termination::Exited(4 | 8 | 16));

    let all = controller
        .run(&target, Control::at(start).with_inject_after(true), false)
        .unwrap();
    assert_eq!(all.termination, Termination::Exited(31));
}

#[test]
fn test_every_kind_fails_like_the_host_allocator() {
    let controller = controller();

    // Finding the window already proves each call fails on its own index
    // with the expected errno.
    let start = first_index_of(&controller, "kinds", KINDS_CALLS);
    let target = fixture("kinds");

    let posix = controller
        .run(&target, Control::at(start + POSIX_MEMALIGN_CALL), false)
        .unwrap();
    assert_eq!(posix.termination, Termination::Exited(1 << 6));

    let sticky = controller
        .run(&target, Control::at(start + 3).with_inject_after(true), false)
        .unwrap();
    assert_eq!(sticky.termination, Termination::Exited(8 | 16 | 32 | 64));
}

#[test]
fn test_index_past_the_end_changes_nothing() {
    let controller = controller();

    let total = counted(&controller, "pattern").total;
    let report = controller
        .run(&fixture("pattern"), Control::at(total + 10), true)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(0));
    assert_eq!(report.stats.collected().map(|s| s.total), Some(total));
}

/// Resumes this process's stopped children until dropped.
struct Resumer {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Resumer {
    fn start() -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let handle = thread::spawn(move || {
            let parent = getpid().as_raw();
            while !flag.load(Ordering::Relaxed) {
                for pid in stopped_children(parent) {
                    let _ = kill(Pid::from_raw(pid), Signal::SIGCONT);
                }
                thread::sleep(Duration::from_millis(20));
            }
        });
        Self {
            done,
            handle: Some(handle),
        }
    }
}

impl Drop for Resumer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn stopped_children(parent: i32) -> Vec<i32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter(|pid| {
            // "pid (comm) state ppid ..."
            let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
                return false;
            };
            let Some((_, rest)) = stat.rsplit_once(')') else {
                return false;
            };
            let mut fields = rest.split_whitespace();
            let state = fields.next();
            let ppid = fields.next().and_then(|p| p.parse::<i32>().ok());
            state == Some("T") && ppid == Some(parent)
        })
        .collect()
}

#[test]
fn test_stop_pauses_then_fails_the_call() {
    let controller = controller();
    let start = first_index_of(&controller, "kinds", KINDS_CALLS);
    let _resumer = Resumer::start();

    let report = controller
        .run(&fixture("kinds"), Control::at(start + 2).with_stop(true), false)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(1 << 2));
}

#[test]
fn test_posix_memalign_keeps_errno_when_the_pause_message_is_lost() {
    let controller = controller();
    let start = first_index_of(&controller, "kinds", KINDS_CALLS);
    let _resumer = Resumer::start();

    // With stderr closed the pause diagnostic fails with EBADF.
    let control = Control::at(start + POSIX_MEMALIGN_CALL).with_stop(true);
    let report = controller
        .run(&fixture("kinds-nostderr"), control, false)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(1 << 6));
}

#[test]
fn test_library_removes_itself_from_preload() {
    let report = controller()
        .run(&fixture("preload"), Control::counting(), false)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(0));
}

#[test]
fn test_exec_children_inherit_no_channels() {
    let report = controller()
        .run(&fixture("exec"), Control::counting(), true)
        .unwrap();
    assert_eq!(report.termination, Termination::Exited(0));
    assert!(report.stats.collected().is_some());
}
