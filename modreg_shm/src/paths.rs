//! Filesystem layout preparation.
//!
//! Computes nothing on its own — path composition lives on
//! [`modreg_common::config::RegistryConfig`] — but owns directory creation
//! with the permission bits and umask handling the layout requires.

use crate::error::RegistryResult;
use modreg_common::config::RegistryConfig;
use modreg_common::consts::DIR_PERM;
use nix::sys::stat::{umask, Mode};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Create `dir` (and parents) with mode `0777 & ~umask`, matching existing
/// directories without error.
pub fn ensure_dir(dir: &Path) -> RegistryResult<()> {
    let saved = umask(Mode::empty());
    let result = (|| -> RegistryResult<()> {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_PERM & !saved.bits()))?;
        Ok(())
    })();
    umask(saved);
    result
}

/// Create every directory the registry's filesystem layout needs under
/// `config.repo_root`: the root itself, `conn/`, and `data/`.
pub fn ensure_layout_dirs(config: &RegistryConfig) -> RegistryResult<()> {
    ensure_dir(&config.repo_root)?;
    ensure_dir(&config.conn_dir())?;
    ensure_dir(&config.data_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_layout_dirs_creates_all_three() {
        let dir = tempdir().unwrap();
        let cfg = RegistryConfig {
            repo_root: dir.path().join("root"),
            ..Default::default()
        };
        ensure_layout_dirs(&cfg).unwrap();
        assert!(cfg.repo_root.is_dir());
        assert!(cfg.conn_dir().is_dir());
        assert!(cfg.data_dir().is_dir());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        ensure_dir(&target).unwrap();
        ensure_dir(&target).unwrap();
        assert!(target.is_dir());
    }
}
