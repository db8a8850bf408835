//! Cross-process Connection Liveness Tracker scenario (SPEC_FULL.md §8,
//! scenario 5: "Liveness after crash").
//!
//! Forks a child to register a cid, confirms a *different* process sees it
//! as alive, kills the child, and confirms the parent's next `check` both
//! reports not-alive and garbage-collects the leftover lockfile.
//!
//! Forking a multithreaded test binary is inherently a little fragile (the
//! child inherits only the calling thread); keep this test minimal and run
//! the suite with `--test-threads=1` if it ever flakes under parallel tests.

use modreg_common::config::RegistryConfig;
use modreg_shm::clt;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use std::thread;
use std::time::Duration;

fn test_config(root: &std::path::Path) -> RegistryConfig {
    RegistryConfig {
        repo_root: root.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn liveness_survives_across_processes_and_clears_on_crash() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    modreg_shm::paths::ensure_layout_dirs(&cfg).unwrap();

    let cid = 777;
    let ready_path = dir.path().join("child_ready");

    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            clt::register(&cfg, cid, std::process::id()).unwrap();
            std::fs::write(&ready_path, b"1").unwrap();
            loop {
                thread::sleep(Duration::from_millis(50));
            }
        }
        ForkResult::Parent { child } => {
            for _ in 0..200 {
                if ready_path.exists() {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            assert!(ready_path.exists(), "child never registered in time");

            let status = clt::check(&cfg, cid).unwrap();
            assert!(status.alive);
            assert_eq!(status.pid, child.as_raw());

            kill(child, Signal::SIGKILL).unwrap();
            let wait_status = waitpid(child, None).unwrap();
            assert!(matches!(wait_status, WaitStatus::Signaled(_, Signal::SIGKILL, _)));

            // give the kernel a moment to tear down the child's fd table
            thread::sleep(Duration::from_millis(100));
            let status = clt::check(&cfg, cid).unwrap();
            assert!(!status.alive);
            assert!(!cfg.conn_lock_path(cid).exists());
        }
    }
}
