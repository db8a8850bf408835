//! Process-shared mutex and rwlock primitives.
//!
//! Rust's standard and `parking_lot` mutexes park using process-local
//! bookkeeping and cannot be used across process boundaries. The header
//! mutexes and per-module rwlocks embedded in the arena instead wrap raw
//! `libc::pthread_mutex_t` / `pthread_rwlock_t`, initialized with
//! `PTHREAD_PROCESS_SHARED`. Every acquisition is bounded by a timeout via
//! `pthread_*_timedlock`.

use crate::error::{RegistryError, RegistryResult};
use std::mem::MaybeUninit;

// The `libc` crate does not bind these two glibc entry points (only the
// non-timed `try*` variants and the mutex `timedlock` are present). They are
// real, stable glibc symbols (`_POSIX_C_SOURCE >= 200112L`), so declare them
// ourselves rather than emulate timeouts with a polling loop.
unsafe extern "C" {
    fn pthread_rwlock_timedrdlock(
        rwlock: *mut libc::pthread_rwlock_t,
        abs_timeout: *const libc::timespec,
    ) -> libc::c_int;
    fn pthread_rwlock_timedwrlock(
        rwlock: *mut libc::pthread_rwlock_t,
        abs_timeout: *const libc::timespec,
    ) -> libc::c_int;
}

/// Size in bytes of a process-shared mutex, for arena layout arithmetic.
pub const MUTEX_SIZE: usize = std::mem::size_of::<libc::pthread_mutex_t>();

/// Size in bytes of a process-shared rwlock, for arena layout arithmetic.
pub const RWLOCK_SIZE: usize = std::mem::size_of::<libc::pthread_rwlock_t>();

fn deadline(timeout_ms: u64) -> RegistryResult<libc::timespec> {
    let mut now = MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, now.as_mut_ptr()) };
    if rc != 0 {
        return Err(RegistryError::System {
            syscall: "clock_gettime",
            source: std::io::Error::last_os_error(),
        });
    }
    let mut ts = unsafe { now.assume_init() };
    ts.tv_sec += (timeout_ms / 1000) as i64;
    ts.tv_nsec += ((timeout_ms % 1000) * 1_000_000) as i64;
    if ts.tv_nsec >= 1_000_000_000 {
        ts.tv_nsec -= 1_000_000_000;
        ts.tv_sec += 1;
    }
    Ok(ts)
}

/// Initialize a mutex in place at `ptr` as process-shared.
///
/// # Safety
/// `ptr` must point to at least [`MUTEX_SIZE`] writable, properly aligned
/// bytes that outlive every process that will lock it.
pub unsafe fn init_mutex_pshared(ptr: *mut libc::pthread_mutex_t) -> RegistryResult<()> {
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        if libc::pthread_mutexattr_init(attr.as_mut_ptr()) != 0 {
            return Err(RegistryError::System {
                syscall: "pthread_mutexattr_init",
                source: std::io::Error::last_os_error(),
            });
        }
        let mut attr = attr.assume_init();
        libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        let rc = libc::pthread_mutex_init(ptr, &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        if rc != 0 {
            return Err(RegistryError::System {
                syscall: "pthread_mutex_init",
                source: std::io::Error::from_raw_os_error(rc),
            });
        }
        Ok(())
    }
}

/// Acquire `ptr`, waiting at most `timeout_ms` milliseconds.
///
/// # Safety
/// `ptr` must have been initialized with [`init_mutex_pshared`] and must
/// remain valid for the duration of the call.
pub unsafe fn lock_mutex_timed(
    ptr: *mut libc::pthread_mutex_t,
    timeout_ms: u64,
) -> RegistryResult<()> {
    let ts = deadline(timeout_ms)?;
    let rc = unsafe { libc::pthread_mutex_timedlock(ptr, &ts) };
    match rc {
        0 => Ok(()),
        libc::ETIMEDOUT => Err(RegistryError::Timeout("mutex".into())),
        other => Err(RegistryError::System {
            syscall: "pthread_mutex_timedlock",
            source: std::io::Error::from_raw_os_error(other),
        }),
    }
}

/// Release `ptr`.
///
/// # Safety
/// `ptr` must currently be locked by the calling thread.
pub unsafe fn unlock_mutex(ptr: *mut libc::pthread_mutex_t) -> RegistryResult<()> {
    let rc = unsafe { libc::pthread_mutex_unlock(ptr) };
    if rc != 0 {
        return Err(RegistryError::System {
            syscall: "pthread_mutex_unlock",
            source: std::io::Error::from_raw_os_error(rc),
        });
    }
    Ok(())
}

/// Initialize a rwlock in place at `ptr` as process-shared.
///
/// # Safety
/// Same requirements as [`init_mutex_pshared`], sized for [`RWLOCK_SIZE`].
pub unsafe fn init_rwlock_pshared(ptr: *mut libc::pthread_rwlock_t) -> RegistryResult<()> {
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_rwlockattr_t>::uninit();
        if libc::pthread_rwlockattr_init(attr.as_mut_ptr()) != 0 {
            return Err(RegistryError::System {
                syscall: "pthread_rwlockattr_init",
                source: std::io::Error::last_os_error(),
            });
        }
        let mut attr = attr.assume_init();
        libc::pthread_rwlockattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        let rc = libc::pthread_rwlock_init(ptr, &attr);
        libc::pthread_rwlockattr_destroy(&mut attr);
        if rc != 0 {
            return Err(RegistryError::System {
                syscall: "pthread_rwlock_init",
                source: std::io::Error::from_raw_os_error(rc),
            });
        }
        Ok(())
    }
}

/// Acquire `ptr` for reading, waiting at most `timeout_ms` milliseconds.
///
/// # Safety
/// `ptr` must have been initialized with [`init_rwlock_pshared`].
pub unsafe fn read_lock_timed(
    ptr: *mut libc::pthread_rwlock_t,
    timeout_ms: u64,
) -> RegistryResult<()> {
    let ts = deadline(timeout_ms)?;
    let rc = unsafe { pthread_rwlock_timedrdlock(ptr, &ts) };
    match rc {
        0 => Ok(()),
        libc::ETIMEDOUT => Err(RegistryError::Timeout("rwlock read".into())),
        other => Err(RegistryError::System {
            syscall: "pthread_rwlock_timedrdlock",
            source: std::io::Error::from_raw_os_error(other),
        }),
    }
}

/// Acquire `ptr` for writing, waiting at most `timeout_ms` milliseconds.
///
/// # Safety
/// `ptr` must have been initialized with [`init_rwlock_pshared`].
pub unsafe fn write_lock_timed(
    ptr: *mut libc::pthread_rwlock_t,
    timeout_ms: u64,
) -> RegistryResult<()> {
    let ts = deadline(timeout_ms)?;
    let rc = unsafe { pthread_rwlock_timedwrlock(ptr, &ts) };
    match rc {
        0 => Ok(()),
        libc::ETIMEDOUT => Err(RegistryError::Timeout("rwlock write".into())),
        other => Err(RegistryError::System {
            syscall: "pthread_rwlock_timedwrlock",
            source: std::io::Error::from_raw_os_error(other),
        }),
    }
}

/// Release `ptr`.
///
/// # Safety
/// `ptr` must currently be held (read or write) by the calling thread.
pub unsafe fn unlock_rwlock(ptr: *mut libc::pthread_rwlock_t) -> RegistryResult<()> {
    let rc = unsafe { libc::pthread_rwlock_unlock(ptr) };
    if rc != 0 {
        return Err(RegistryError::System {
            syscall: "pthread_rwlock_unlock",
            source: std::io::Error::from_raw_os_error(rc),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn mutex_lock_unlock_round_trip() {
        let mut m = MaybeUninit::<libc::pthread_mutex_t>::uninit();
        unsafe {
            init_mutex_pshared(m.as_mut_ptr()).unwrap();
            lock_mutex_timed(m.as_mut_ptr(), 100).unwrap();
            unlock_mutex(m.as_mut_ptr()).unwrap();
        }
    }

    #[test]
    fn mutex_contention_times_out() {
        let mut m = MaybeUninit::<libc::pthread_mutex_t>::uninit();
        unsafe {
            init_mutex_pshared(m.as_mut_ptr()).unwrap();
            lock_mutex_timed(m.as_mut_ptr(), 100).unwrap();
            // already held by this thread; a second timed attempt must time out
            let result = lock_mutex_timed(m.as_mut_ptr(), 50);
            assert!(matches!(result, Err(RegistryError::Timeout(_))));
            unlock_mutex(m.as_mut_ptr()).unwrap();
        }
    }

    #[test]
    fn rwlock_read_then_write_round_trip() {
        let mut l = MaybeUninit::<libc::pthread_rwlock_t>::uninit();
        unsafe {
            init_rwlock_pshared(l.as_mut_ptr()).unwrap();
            read_lock_timed(l.as_mut_ptr(), 100).unwrap();
            unlock_rwlock(l.as_mut_ptr()).unwrap();
            write_lock_timed(l.as_mut_ptr(), 100).unwrap();
            unlock_rwlock(l.as_mut_ptr()).unwrap();
        }
    }
}
