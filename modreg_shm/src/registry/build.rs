//! The three-stage MSR build algorithm.
//!
//! Stage A allocates the fixed module record array (one remap). Stage B
//! fills scalar fields and the name/feature tails (one remap per module).
//! Stage C fills dependencies, RPCs, and notifications, each as its own
//! count → remap → copy sub-pass, so that every module's `name` offset is
//! final and resolvable before any inter-module reference is written.

use super::layout::{
    module_offset, DepKind, DepRecord, ModuleRecord, NotifRecord, RpcRecord, SchemaDep,
    SchemaTree, DEP_RECORD_SIZE, NOTIF_RECORD_SIZE, RPC_RECORD_SIZE,
};
use super::{find_module_index, header_mut, module_mut, module_ref};
use crate::arena::Arena;
use crate::error::{RegistryError, RegistryResult};
use crate::sync;
use modreg_common::consts::DS_COUNT;
use std::sync::atomic::Ordering;

/// Resolve `name` to a module index during Stage C. Unlike the public
/// lookup API, an unresolved name here means the schema tree itself
/// references a module that was never allocated in Stage A — an internal
/// invariant violation, not a lookup miss.
fn resolve_module_index(arena: &Arena, name: &str) -> RegistryResult<usize> {
    find_module_index(arena, name).map_err(|_| {
        RegistryError::Internal(format!("dependency references unknown module '{name}'"))
    })
}

/// Validate a [`SchemaDep`] against the typing invariant: a `Ref` dep names
/// a module and no path; an `InstId` dep always has a path.
fn validate_dep(d: &SchemaDep) -> RegistryResult<()> {
    match d.kind {
        DepKind::Ref => {
            if d.module.is_none() || d.path.is_some() {
                return Err(RegistryError::InvalArg(format!(
                    "REF dependency must have a module and no path (module={:?}, path={:?})",
                    d.module, d.path
                )));
            }
        }
        DepKind::InstId => {
            if d.path.is_none() {
                return Err(RegistryError::InvalArg(
                    "INSTID dependency must have a path".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Round `offset` up to the next multiple of 8.
///
/// `DepRecord`/`RpcRecord`/`NotifRecord` arrays are reinterpreted as Rust
/// structs directly over arena bytes (`RpcRecord`/`NotifRecord` additionally
/// embed a `pthread_rwlock_t`), so every array placed after a variable-length
/// name/path tail must restart on an aligned boundary.
fn align8(offset: usize) -> usize {
    (offset + 7) & !7
}

/// Build (or rebuild) the registry from `tree`, overwriting every module's
/// dependency/RPC/notification tails.
///
/// Callers are expected to hold the header's `lydmods_lock` (or the
/// create-lock, for an initial build) for the duration of this call.
pub fn store_modules(arena: &mut Arena, tree: &SchemaTree) -> RegistryResult<usize> {
    let n = tree.modules.len();
    let mut shm_end = stage_a_allocate(arena, n)?;
    stage_b_fill_scalars(arena, tree, &mut shm_end)?;
    for i in 0..n {
        shm_end = add_module_deps(arena, n, i, &tree.modules[i], shm_end)?;
    }
    for i in 0..n {
        shm_end = add_module_rpcs(arena, n, i, &tree.modules[i], shm_end)?;
    }
    for i in 0..n {
        shm_end = add_module_notifs(arena, n, i, &tree.modules[i], shm_end)?;
    }
    Ok(shm_end)
}

fn stage_a_allocate(arena: &mut Arena, n: usize) -> RegistryResult<usize> {
    let new_size = module_offset(n);
    arena.remap(new_size)?;
    header_mut(arena).mod_count = n as u32;

    for i in 0..n {
        let rec = module_mut(arena, i)?;
        unsafe {
            std::ptr::write_bytes(rec as *mut ModuleRecord as *mut u8, 0, std::mem::size_of::<ModuleRecord>());
            for ds in 0..DS_COUNT {
                sync::init_rwlock_pshared(&mut rec.data_lock_info[ds])?;
                sync::init_rwlock_pshared(&mut rec.change_sub[ds])?;
            }
            sync::init_rwlock_pshared(&mut rec.replay_lock)?;
            sync::init_rwlock_pshared(&mut rec.oper_lock)?;
            sync::init_rwlock_pshared(&mut rec.notif_lock)?;
        }
    }
    Ok(new_size)
}

fn stage_b_fill_scalars(arena: &mut Arena, tree: &SchemaTree, shm_end: &mut usize) -> RegistryResult<()> {
    for (i, m) in tree.modules.iter().enumerate() {
        let name_len = m.name.len() + 1;
        let feat_offsets_len = m.enabled_features.len() * 4;
        let feat_strs_len: usize = m.enabled_features.iter().map(|f| f.len() + 1).sum();
        let needed = name_len + feat_offsets_len + feat_strs_len;
        arena.remap(*shm_end + needed)?;

        let name_off = *shm_end as u32;
        arena.write_cstr(name_off, &m.name)?;
        let mut cursor = *shm_end + name_len;

        let features_off = cursor as u32;
        cursor += feat_offsets_len;
        let mut feat_str_offs = Vec::with_capacity(m.enabled_features.len());
        for f in &m.enabled_features {
            feat_str_offs.push(cursor as u32);
            cursor += f.len() + 1;
        }
        for (j, off) in feat_str_offs.iter().enumerate() {
            arena.write_bytes(features_off + (j * 4) as u32, &off.to_ne_bytes())?;
        }
        for (off, f) in feat_str_offs.iter().zip(&m.enabled_features) {
            arena.write_cstr(*off, f)?;
        }

        let rec = module_mut(arena, i)?;
        rec.name = name_off;
        let mut rev_bytes = [0u8; 16];
        let rb = m.revision.as_bytes();
        let copy_len = rb.len().min(15);
        rev_bytes[..copy_len].copy_from_slice(&rb[..copy_len]);
        rec.rev = rev_bytes;
        rec.replay_supp.store(m.replay_support as u32, Ordering::Relaxed);
        rec.feat_count = m.enabled_features.len() as u32;
        rec.features = features_off;

        *shm_end = cursor;
    }
    Ok(())
}

/// Write a `DepRecord` array for `deps`, resolving each `module` reference
/// via [`find_module_index`]. Returns `(array_offset, count, new_shm_end)`.
fn write_deps_array(
    arena: &mut Arena,
    deps: &[SchemaDep],
    shm_end: usize,
) -> RegistryResult<(u32, u32, usize)> {
    let shm_end = align8(shm_end);
    let array_len = deps.len() * DEP_RECORD_SIZE;
    let path_bytes: usize = deps.iter().filter_map(|d| d.path.as_ref()).map(|p| p.len() + 1).sum();
    arena.remap(shm_end + array_len + path_bytes)?;

    let array_off = shm_end as u32;
    let mut cursor = shm_end + array_len;

    for (j, d) in deps.iter().enumerate() {
        validate_dep(d)?;
        let module_off = match &d.module {
            Some(name) => {
                let idx = resolve_module_index(arena, name)?;
                module_ref(arena, idx)?.name
            }
            None => 0,
        };
        let path_off = match &d.path {
            Some(p) => {
                let off = cursor as u32;
                arena.write_cstr(off, p)?;
                cursor += p.len() + 1;
                off
            }
            None => 0,
        };
        let rec = DepRecord {
            dep_type: d.kind as u32,
            module: module_off,
            path: path_off,
        };
        let bytes = unsafe {
            std::slice::from_raw_parts(&rec as *const DepRecord as *const u8, DEP_RECORD_SIZE)
        };
        arena.write_bytes(array_off + (j * DEP_RECORD_SIZE) as u32, bytes)?;
    }
    Ok((array_off, deps.len() as u32, cursor))
}

fn add_module_deps(
    arena: &mut Arena,
    n_modules: usize,
    idx: usize,
    m: &super::layout::SchemaModule,
    shm_end: usize,
) -> RegistryResult<usize> {
    let (deps_off, dep_count, mut end) = write_deps_array(arena, &m.deps, shm_end)?;

    let invdeps_needed = m.inverse_deps.len() * 4;
    arena.remap(end + invdeps_needed)?;
    let invdeps_off = end as u32;
    for (j, name) in m.inverse_deps.iter().enumerate() {
        let target = resolve_module_index(arena, name)?;
        if target == idx {
            return Err(crate::error::RegistryError::Internal(format!(
                "module '{name}' cannot be its own inverse dependency"
            )));
        }
        let name_off = module_ref(arena, target)?.name;
        arena.write_bytes(invdeps_off + (j * 4) as u32, &name_off.to_ne_bytes())?;
    }
    end += invdeps_needed;
    let _ = n_modules;

    let rec = module_mut(arena, idx)?;
    rec.dep_count = dep_count;
    rec.deps = deps_off;
    rec.inv_dep_count = m.inverse_deps.len() as u32;
    rec.inv_deps = invdeps_off;

    Ok(end)
}

fn add_module_rpcs(
    arena: &mut Arena,
    n_modules: usize,
    idx: usize,
    m: &super::layout::SchemaModule,
    shm_end: usize,
) -> RegistryResult<usize> {
    let shm_end = align8(shm_end);
    let rpc_count = m.rpcs.len();
    let rpcs_needed = rpc_count * RPC_RECORD_SIZE;
    arena.remap(shm_end + rpcs_needed)?;
    let rpcs_off = shm_end as u32;
    let mut end = shm_end + rpcs_needed;

    for (j, rpc) in m.rpcs.iter().enumerate() {
        let path_needed = rpc.path.len() + 1;
        arena.remap(end + path_needed)?;
        let path_off = end as u32;
        arena.write_cstr(path_off, &rpc.path)?;
        end += path_needed;

        let (in_off, in_count, e2) = write_deps_array(arena, &rpc.in_deps, end)?;
        end = e2;
        let (out_off, out_count, e3) = write_deps_array(arena, &rpc.out_deps, end)?;
        end = e3;
        let _ = n_modules;

        unsafe {
            let rec_ptr =
                arena.as_mut_ptr().add(rpcs_off as usize + j * RPC_RECORD_SIZE) as *mut RpcRecord;
            (*rec_ptr).path = path_off;
            (*rec_ptr).in_dep_count = in_count;
            (*rec_ptr).in_deps = in_off;
            (*rec_ptr).out_dep_count = out_count;
            (*rec_ptr).out_deps = out_off;
            sync::init_rwlock_pshared(&mut (*rec_ptr).lock)?;
        }
    }

    let rec = module_mut(arena, idx)?;
    rec.rpc_count = rpc_count as u32;
    rec.rpcs = rpcs_off;

    Ok(end)
}

fn add_module_notifs(
    arena: &mut Arena,
    n_modules: usize,
    idx: usize,
    m: &super::layout::SchemaModule,
    shm_end: usize,
) -> RegistryResult<usize> {
    let shm_end = align8(shm_end);
    let notif_count = m.notifications.len();
    let notifs_needed = notif_count * NOTIF_RECORD_SIZE;
    arena.remap(shm_end + notifs_needed)?;
    let notifs_off = shm_end as u32;
    let mut end = shm_end + notifs_needed;

    for (j, notif) in m.notifications.iter().enumerate() {
        let path_needed = notif.path.len() + 1;
        arena.remap(end + path_needed)?;
        let path_off = end as u32;
        arena.write_cstr(path_off, &notif.path)?;
        end += path_needed;

        let (deps_off, dep_count, e2) = write_deps_array(arena, &notif.deps, end)?;
        end = e2;
        let _ = n_modules;

        unsafe {
            let rec_ptr = arena.as_mut_ptr().add(notifs_off as usize + j * NOTIF_RECORD_SIZE)
                as *mut NotifRecord;
            (*rec_ptr).path = path_off;
            (*rec_ptr).dep_count = dep_count;
            (*rec_ptr).deps = deps_off;
        }
    }

    let rec = module_mut(arena, idx)?;
    rec.notif_count = notif_count as u32;
    rec.notifs = notifs_off;

    Ok(end)
}
