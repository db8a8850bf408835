//! Create-lock acquisition and the `main_open` bootstrap sequence.
//!
//! The create-lock lives on its own dedicated file (`main_shm.lock`), never
//! on the SHM arena itself — taking a lock on a file that is about to be
//! truncated/remapped is a recipe for the lock silently covering the wrong
//! inode.

use crate::arena::Arena;
use crate::error::{RegistryError, RegistryResult};
use crate::lockfile;
use crate::registry::layout::{Header, HEADER_SIZE};
use crate::{paths, sync};
use modreg_common::config::RegistryConfig;
use modreg_common::consts::{Datastore, FILE_PERM, SHM_VERSION};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chown, Gid, Uid};
use std::fs::OpenOptions;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Holds the create-lock open for the duration of a bootstrap or rebuild;
/// releases it on drop.
pub struct CreateLock {
    file: std::fs::File,
}

impl CreateLock {
    /// Open (creating if needed) and exclusively lock the create-lock file,
    /// blocking until acquired.
    pub fn acquire(config: &RegistryConfig) -> RegistryResult<Self> {
        let path = config.create_lock_path();
        let saved = umask(Mode::empty());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(FILE_PERM & !saved.bits() as u32)
            .open(&path);
        umask(saved);
        let file = file?;
        lockfile::lock_exclusive_blocking(file.as_raw_fd())?;
        Ok(CreateLock { file })
    }
}

impl Drop for CreateLock {
    fn drop(&mut self) {
        let _ = lockfile::unlock(self.file.as_raw_fd());
    }
}

/// Open the main SHM arena, creating and initializing it if absent.
///
/// Callers must hold a [`CreateLock`] for the duration of this call when an
/// initial creation is possible (i.e. always, except when the caller has
/// already independently verified the arena exists).
pub fn main_open(config: &RegistryConfig) -> RegistryResult<Arena> {
    paths::ensure_layout_dirs(config)?;
    let path = config.main_shm_path();

    match Arena::open(&path) {
        Ok(arena) => {
            verify_header(&arena)?;
            Ok(arena)
        }
        Err(RegistryError::NotFound(_)) => create_arena(&path),
        Err(e) => Err(e),
    }
}

fn verify_header(arena: &Arena) -> RegistryResult<()> {
    if arena.size() < HEADER_SIZE {
        return Err(RegistryError::Internal("arena smaller than header".into()));
    }
    let header = unsafe { &*(arena.as_ptr() as *const Header) };
    if header.shm_ver != SHM_VERSION {
        return Err(RegistryError::Unsupported(format!(
            "SHM version mismatch (have {}, need {}); remove the SHM files to fix",
            header.shm_ver, SHM_VERSION
        )));
    }
    Ok(())
}

fn create_arena(path: &std::path::Path) -> RegistryResult<Arena> {
    let mut arena = Arena::create(path, HEADER_SIZE, FILE_PERM)?;
    let header = unsafe { &mut *(arena.as_mut_ptr() as *mut Header) };
    header.shm_ver = SHM_VERSION;
    unsafe {
        sync::init_mutex_pshared(&mut header.lydmods_lock)?;
        sync::init_mutex_pshared(&mut header.ext_lock)?;
    }
    header.new_cid.store(1, std::sync::atomic::Ordering::Relaxed);
    header.new_sid.store(1, std::sync::atomic::Ordering::Relaxed);
    header.new_sub_id.store(1, std::sync::atomic::Ordering::Relaxed);
    header
        .new_evpipe_num
        .store(1, std::sync::atomic::Ordering::Relaxed);
    header.mod_count = 0;
    Ok(arena)
}

/// Owner/group/permission triple read off a datastore file.
struct FilePerm {
    uid: u32,
    gid: u32,
    /// Read/write bits only (`& 0o666`), matching the original's masking.
    perm: u32,
}

fn get_perm(path: &Path) -> RegistryResult<FilePerm> {
    let meta = std::fs::metadata(path)?;
    Ok(FilePerm {
        uid: meta.uid(),
        gid: meta.gid(),
        perm: meta.mode() & 0o666,
    })
}

/// Correct `path`'s owner/group/permission bits to match `want`, touching
/// only the attributes that actually drifted.
fn chmodown(path: &Path, want: &FilePerm) -> RegistryResult<()> {
    let cur = get_perm(path)?;
    if cur.uid != want.uid || cur.gid != want.gid {
        chown(path, Some(Uid::from_raw(want.uid)), Some(Gid::from_raw(want.gid)))?;
    }
    if cur.perm != want.perm {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(want.perm))?;
    }
    Ok(())
}

/// Reconcile per-module datastore file ownership and permissions under
/// `config.data_dir()`.
///
/// The startup file's owner/group and `0666`-masked permission bits are the
/// reference: the running file must already exist and is corrected in place
/// to match; the operational file is created if absent (`0666 & ~umask`) and
/// then likewise corrected. The startup file itself is never modified.
pub fn check_data_files(config: &RegistryConfig, module_names: &[String]) -> RegistryResult<()> {
    paths::ensure_dir(&config.data_dir())?;
    for name in module_names {
        let startup_path = config
            .data_dir()
            .join(format!("{name}.{}", Datastore::Startup.file_suffix()));
        let want = get_perm(&startup_path)?;

        let running_path = config
            .data_dir()
            .join(format!("{name}.{}", Datastore::Running.file_suffix()));
        chmodown(&running_path, &want)?;

        let operational_path = config
            .data_dir()
            .join(format!("{name}.{}", Datastore::Operational.file_suffix()));
        if !operational_path.exists() {
            let saved = umask(Mode::empty());
            let result = OpenOptions::new()
                .write(true)
                .create(true)
                .mode(FILE_PERM & !saved.bits() as u32)
                .open(&operational_path);
            umask(saved);
            result?;
        }
        chmodown(&operational_path, &want)?;
    }
    Ok(())
}
