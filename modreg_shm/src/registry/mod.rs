//! Main Shared-Memory Registry: arena layout, build pipeline, and lookups.

pub mod build;
pub mod layout;
pub mod msr;

use crate::arena::Arena;
use crate::error::{RegistryError, RegistryResult};
use layout::{module_offset, Header, ModuleRecord, HEADER_SIZE};

/// Borrow the header at the arena's current base. Invalidated by `remap`.
pub(crate) fn header_ref(arena: &Arena) -> &Header {
    unsafe { &*(arena.as_ptr() as *const Header) }
}

/// Mutably borrow the header at the arena's current base.
pub(crate) fn header_mut(arena: &mut Arena) -> &mut Header {
    unsafe { &mut *(arena.as_mut_ptr() as *mut Header) }
}

/// Borrow module record `i`. Panics-free bound check against `mod_count`.
pub(crate) fn module_ref(arena: &Arena, i: usize) -> RegistryResult<&ModuleRecord> {
    let count = header_ref(arena).mod_count as usize;
    if i >= count {
        return Err(RegistryError::Internal(format!(
            "module index {i} out of range (mod_count={count})"
        )));
    }
    Ok(unsafe { &*(arena.as_ptr().add(module_offset(i)) as *const ModuleRecord) })
}

/// Mutably borrow module record `i`.
pub(crate) fn module_mut(arena: &mut Arena, i: usize) -> RegistryResult<&mut ModuleRecord> {
    let count = header_ref(arena).mod_count as usize;
    if i >= count {
        return Err(RegistryError::Internal(format!(
            "module index {i} out of range (mod_count={count})"
        )));
    }
    Ok(unsafe { &mut *(arena.as_mut_ptr().add(module_offset(i)) as *mut ModuleRecord) })
}

/// Linear scan for the module named `name`. Returns its index.
pub(crate) fn find_module_index(arena: &Arena, name: &str) -> RegistryResult<usize> {
    let count = header_ref(arena).mod_count as usize;
    for i in 0..count {
        let rec = module_ref(arena, i)?;
        if arena.read_cstr(rec.name)? == name {
            return Ok(i);
        }
    }
    Err(RegistryError::NotFound(format!("module '{name}'")))
}

/// Sanity check for the offset-closure / count-exactness testable properties:
/// the arena must be exactly as large as the header plus `mod_count` fixed
/// records plus everything appended after — i.e. no trailing slack and no
/// overrun. Since growth is strictly append-only this reduces to comparing
/// the tracked write cursor against the mapped size.
pub fn assert_closed(arena: &Arena, shm_end: usize) -> RegistryResult<()> {
    if shm_end != arena.size() {
        return Err(RegistryError::Internal(format!(
            "shm_end {shm_end} != arena size {} after build",
            arena.size()
        )));
    }
    if arena.size() < HEADER_SIZE {
        return Err(RegistryError::Internal("arena smaller than header".into()));
    }
    Ok(())
}
