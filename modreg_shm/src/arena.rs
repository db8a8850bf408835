//! A growable memory-mapped arena.
//!
//! All cross-process references into an [`Arena`] are expressed as byte
//! offsets from its base, never as absolute pointers — the arena's virtual
//! address can and does change across a [`Arena::remap`].

use crate::error::{RegistryError, RegistryResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// A growable `mmap`-backed region shared across processes.
///
/// Growth is append-only within a single write pass: callers track their own
/// write cursor and call [`Arena::remap`] once per sub-structure as described
/// by the build algorithm; nothing in `Arena` itself enforces that protocol.
pub struct Arena {
    file: File,
    mmap: MmapMut,
}

impl Arena {
    /// Open an existing arena backing file, mapping its current length.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Arena { file, mmap })
    }

    /// Create a new arena backing file exclusively (`O_CREAT|O_EXCL`) with
    /// the given mode bits (before umask), zero-extended to `initial_size`.
    pub fn create(path: &Path, initial_size: usize, mode: u32) -> RegistryResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)?;
        file.set_len(initial_size as u64)?;
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Arena { file, mmap })
    }

    /// Grow (or re-map at the current length, if `new_size == 0`) the arena.
    ///
    /// Extension is zero-filled by the filesystem. The mapping's virtual
    /// address may change; any offsets computed before this call remain
    /// valid relative to [`Arena::base`], but raw pointers taken from
    /// [`Arena::as_mut_ptr`] do not.
    pub fn remap(&mut self, new_size: usize) -> RegistryResult<()> {
        let target = if new_size == 0 {
            self.file.metadata()?.len() as usize
        } else {
            new_size
        };
        if target as u64 > self.mmap.len() as u64 {
            self.file.set_len(target as u64)?;
        }
        let mmap = unsafe { MmapOptions::new().map_mut(&self.file)? };
        self.mmap = mmap;
        Ok(())
    }

    /// Current mapped size in bytes.
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Raw pointer to the arena base. Invalidated by the next `remap`.
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    /// Mutable raw pointer to the arena base. Invalidated by the next `remap`.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// Read `len` bytes at `offset`.
    pub fn read_bytes(&self, offset: u32, len: usize) -> RegistryResult<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| RegistryError::Internal("offset overflow".into()))?;
        if end > self.mmap.len() {
            return Err(RegistryError::Internal(format!(
                "read [{start}, {end}) outside arena of size {}",
                self.mmap.len()
            )));
        }
        Ok(&self.mmap[start..end])
    }

    /// Write `data` at `offset`.
    pub fn write_bytes(&mut self, offset: u32, data: &[u8]) -> RegistryResult<()> {
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| RegistryError::Internal("offset overflow".into()))?;
        if end > self.mmap.len() {
            return Err(RegistryError::Internal(format!(
                "write [{start}, {end}) outside arena of size {}",
                self.mmap.len()
            )));
        }
        self.mmap[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Read a NUL-terminated string at `offset`.
    pub fn read_cstr(&self, offset: u32) -> RegistryResult<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        let start = offset as usize;
        if start > self.mmap.len() {
            return Err(RegistryError::Internal(format!(
                "read_cstr offset {start} outside arena of size {}",
                self.mmap.len()
            )));
        }
        let bytes = &self.mmap[start..];
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RegistryError::Internal("unterminated string in arena".into()))?;
        String::from_utf8(bytes[..nul].to_vec())
            .map_err(|e| RegistryError::Internal(format!("invalid utf8 in arena: {e}")))
    }

    /// Append `s` as a NUL-terminated string at `offset`, which must already
    /// be within bounds (callers `remap` before calling this).
    pub fn write_cstr(&mut self, offset: u32, s: &str) -> RegistryResult<()> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write_bytes(offset, &bytes)
    }

    /// Flush dirty pages to the backing file.
    pub fn flush(&self) -> RegistryResult<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_remap_grows_and_zero_fills() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let mut arena = Arena::create(&path, 16, 0o600).unwrap();
        assert_eq!(arena.size(), 16);
        arena.write_bytes(0, b"hello").unwrap();
        arena.remap(64).unwrap();
        assert_eq!(arena.size(), 64);
        assert_eq!(arena.read_bytes(0, 5).unwrap(), b"hello");
        assert_eq!(arena.read_bytes(16, 8).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn cstr_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let mut arena = Arena::create(&path, 64, 0o600).unwrap();
        arena.write_cstr(8, "ietf-interfaces").unwrap();
        assert_eq!(arena.read_cstr(8).unwrap(), "ietf-interfaces");
        assert_eq!(arena.read_cstr(0).unwrap(), "");
    }

    #[test]
    fn open_rejects_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope");
        assert!(Arena::open(&path).is_err());
    }

    #[test]
    fn create_rejects_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let _a = Arena::create(&path, 16, 0o600).unwrap();
        assert!(Arena::create(&path, 16, 0o600).is_err());
    }

    #[test]
    fn out_of_bounds_read_is_internal_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let arena = Arena::create(&path, 16, 0o600).unwrap();
        assert!(matches!(
            arena.read_bytes(10, 100),
            Err(RegistryError::Internal(_))
        ));
    }

    #[test]
    fn out_of_bounds_cstr_is_internal_error_not_a_panic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let arena = Arena::create(&path, 16, 0o600).unwrap();
        assert!(matches!(
            arena.read_cstr(1000),
            Err(RegistryError::Internal(_))
        ));
    }
}
