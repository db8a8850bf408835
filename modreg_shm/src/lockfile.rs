//! Whole-file `fcntl` advisory locking, shared by the create-lock
//! ([`crate::bootstrap`]) and the connection liveness tracker ([`crate::clt`]).
//!
//! Locks are taken on a dedicated file, never on the SHM arena itself, and
//! are always whole-file (`l_whence = SEEK_SET, l_start = 0, l_len = 0`).

use crate::error::{RegistryError, RegistryResult};
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

fn whole_file_lock(l_type: libc::c_short) -> libc::flock {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = l_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = 0;
    fl.l_len = 0;
    fl
}

/// Blocking exclusive lock (`F_SETLKW`); retries on `EINTR`.
pub fn lock_exclusive_blocking(fd: RawFd) -> RegistryResult<()> {
    let fl = whole_file_lock(libc::F_WRLCK as libc::c_short);
    loop {
        let rc = unsafe { libc::fcntl(fd, libc::F_SETLKW, &fl) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            continue;
        }
        return Err(RegistryError::System {
            syscall: "fcntl(F_SETLKW)",
            source: err,
        });
    }
}

/// Non-blocking exclusive lock (`F_SETLK`). Returns `System` if already held
/// by another process (the caller, [`crate::clt::register`], treats this as
/// a cid reuse collision, not an allocation-time "already exists").
pub fn lock_exclusive_nonblocking(fd: RawFd) -> RegistryResult<()> {
    let fl = whole_file_lock(libc::F_WRLCK as libc::c_short);
    let rc = unsafe { libc::fcntl(fd, libc::F_SETLK, &fl) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    Err(RegistryError::System {
        syscall: "fcntl(F_SETLK)",
        source: err,
    })
}

/// Release a whole-file lock (non-blocking `F_SETLK` with `F_UNLCK`).
pub fn unlock(fd: RawFd) -> RegistryResult<()> {
    let fl = whole_file_lock(libc::F_UNLCK as libc::c_short);
    let rc = unsafe { libc::fcntl(fd, libc::F_SETLK, &fl) };
    if rc != 0 {
        return Err(RegistryError::System {
            syscall: "fcntl(F_SETLK, F_UNLCK)",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Outcome of [`get_lock_holder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
    /// Whether any process currently holds an exclusive lock.
    pub locked: bool,
    /// PID of the holder, valid only when `locked` is true.
    pub pid: i32,
}

/// Query whether the whole file is exclusively locked by another process,
/// via `F_GETLK`. Never acquires or releases any lock itself.
pub fn get_lock_holder(fd: RawFd) -> RegistryResult<LockHolder> {
    let mut fl = MaybeUninit::<libc::flock>::uninit();
    {
        let probe = whole_file_lock(libc::F_WRLCK as libc::c_short);
        unsafe { std::ptr::write(fl.as_mut_ptr(), probe) };
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_GETLK, fl.as_mut_ptr()) };
    if rc != 0 {
        return Err(RegistryError::System {
            syscall: "fcntl(F_GETLK)",
            source: std::io::Error::last_os_error(),
        });
    }
    let fl = unsafe { fl.assume_init() };
    if fl.l_type as i32 == libc::F_UNLCK {
        Ok(LockHolder {
            locked: false,
            pid: 0,
        })
    } else {
        Ok(LockHolder {
            locked: true,
            pid: fl.l_pid,
        })
    }
}
