//! Connection Liveness Tracker.
//!
//! A POSIX advisory lock held via `fcntl` is released the instant **any**
//! file descriptor the holding process has open on that file is closed.
//! So checking whether our own connection's cid is alive by opening its
//! lockfile and immediately closing it would release our own lock. Each
//! process therefore keeps every cid it has registered in a private list of
//! `(cid, fd)` pairs and consults that list *before* ever touching the
//! filesystem for a `check`.

use crate::error::{RegistryError, RegistryResult};
use crate::lockfile;
use modreg_common::config::RegistryConfig;
use modreg_common::consts::FILE_PERM;
use nix::sys::stat::{umask, Mode};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::sync::{LazyLock, Mutex};
use tracing::warn;

/// Process-local registry of connections this process holds locks for.
pub struct ConnList {
    entries: Mutex<HashMap<u32, RawFd>>,
}

impl ConnList {
    fn new() -> Self {
        ConnList {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Drop for ConnList {
    fn drop(&mut self) {
        if let Ok(entries) = self.entries.lock() {
            for fd in entries.values() {
                unsafe {
                    libc::close(*fd);
                }
            }
        }
    }
}

static GLOBAL_CONN_LIST: LazyLock<ConnList> = LazyLock::new(ConnList::new);

/// Liveness result reported by [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessStatus {
    /// Whether a live connection with the given cid exists anywhere.
    pub alive: bool,
    /// PID of the owning process, valid only when `alive` is true.
    pub pid: i32,
}

fn open_lock_file_for_register(path: &std::path::Path) -> RegistryResult<RawFd> {
    let saved = umask(Mode::empty());
    let result = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(FILE_PERM & !saved.bits() as u32)
        .open(path);
    umask(saved);
    Ok(result?.into_raw_fd())
}

/// Register `cid` as owned by this process: create its lockfile, write a
/// diagnostic `"/<pid>\n"` line, and take an exclusive non-blocking lock.
///
/// A failure to acquire the lock means another *live* process already owns
/// this cid (collision); the lockfile is left untouched in that case since
/// it is not ours.
pub fn register(config: &RegistryConfig, cid: u32, pid: u32) -> RegistryResult<()> {
    let path = config.conn_lock_path(cid);
    let fd = open_lock_file_for_register(&path)?;

    let line = format!("/{pid}\n");
    let wrote = unsafe { libc::write(fd, line.as_ptr() as *const libc::c_void, line.len()) };
    if wrote < 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err.into());
    }

    if let Err(e) = lockfile::lock_exclusive_nonblocking(fd) {
        unsafe { libc::close(fd) };
        return Err(e);
    }

    let mut entries = GLOBAL_CONN_LIST
        .entries
        .lock()
        .map_err(|_| RegistryError::Internal("conn list mutex poisoned".into()))?;
    entries.insert(cid, fd);
    Ok(())
}

/// Unregister `cid`: close its fd (releasing the lock) and unlink the file.
pub fn unregister(config: &RegistryConfig, cid: u32) -> RegistryResult<()> {
    let fd = {
        let mut entries = GLOBAL_CONN_LIST
            .entries
            .lock()
            .map_err(|_| RegistryError::Internal("conn list mutex poisoned".into()))?;
        entries
            .remove(&cid)
            .ok_or_else(|| RegistryError::Internal(format!("cid {cid} not registered")))?
    };
    unsafe {
        libc::close(fd);
    }
    let path = config.conn_lock_path(cid);
    let _ = std::fs::remove_file(&path);
    Ok(())
}

/// Check whether `cid` is alive, anywhere in the installation.
pub fn check(config: &RegistryConfig, cid: u32) -> RegistryResult<LivenessStatus> {
    {
        let entries = GLOBAL_CONN_LIST
            .entries
            .lock()
            .map_err(|_| RegistryError::Internal("conn list mutex poisoned".into()))?;
        if entries.contains_key(&cid) {
            return Ok(LivenessStatus {
                alive: true,
                pid: crate::platform::get_current_pid() as i32,
            });
        }
    }

    let path = config.conn_lock_path(cid);
    let file = match OpenOptions::new().read(true).write(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LivenessStatus {
                alive: false,
                pid: 0,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let holder = lockfile::get_lock_holder(file.as_raw_fd())?;
    if holder.locked {
        Ok(LivenessStatus {
            alive: true,
            pid: holder.pid,
        })
    } else {
        warn!("Connection with CID {cid} is dead.");
        drop(file);
        let _ = std::fs::remove_file(&path);
        Ok(LivenessStatus {
            alive: false,
            pid: 0,
        })
    }
}
