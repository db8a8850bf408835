//! Main Shared-Memory Registry lookups and mutations performed after the
//! initial build: module/RPC lookup, replay-support toggling, and
//! notification-subscription suspend/resume.
//!
//! Notification subscriptions conceptually live in the companion ext-SHM
//! arena in the system this registry is modeled on; that arena's general
//! purpose (session/subscription bookkeeping unrelated to module layout) is
//! out of scope here. The handful of fields the MSR itself needs to
//! reference — one small, append-only array of notif-sub entries per module
//! — are instead modeled directly in the MSR arena, tracked via
//! `notif_subs`/`notif_sub_count` on [`super::layout::ModuleRecord`]. See
//! `DESIGN.md` for the full rationale.

use super::layout::{DepKind, ModuleRecord};
use super::{find_module_index, header_ref, module_mut, module_ref};
use crate::arena::Arena;
use crate::error::{RegistryError, RegistryResult};
use std::sync::atomic::Ordering;

/// An owned, read-back view of one dependency, for callers and tests that
/// want Rust values rather than raw arena offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepView {
    /// Whether this is a direct module reference or an instance-identifier default.
    pub kind: DepKind,
    /// Target module name, when present.
    pub module: Option<String>,
    /// xpath, when present.
    pub path: Option<String>,
}

fn read_dep(arena: &Arena, rec: &super::layout::DepRecord) -> RegistryResult<DepView> {
    let kind = match rec.dep_type {
        0 => DepKind::Ref,
        1 => DepKind::InstId,
        other => return Err(RegistryError::Internal(format!("unknown dep_type {other}"))),
    };
    let module = if rec.module == 0 {
        None
    } else {
        Some(arena.read_cstr(rec.module)?)
    };
    let path = if rec.path == 0 {
        None
    } else {
        Some(arena.read_cstr(rec.path)?)
    };
    Ok(DepView { kind, module, path })
}

fn read_deps_array(arena: &Arena, offset: u32, count: u32) -> RegistryResult<Vec<DepView>> {
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let bytes = arena.read_bytes(
            offset + i * super::layout::DEP_RECORD_SIZE as u32,
            super::layout::DEP_RECORD_SIZE,
        )?;
        let rec: &super::layout::DepRecord =
            unsafe { &*(bytes.as_ptr() as *const super::layout::DepRecord) };
        out.push(read_dep(arena, rec)?);
    }
    Ok(out)
}

/// A read-back view of one module's full set of dependencies, features,
/// RPCs, and notifications, for round-trip assertions.
#[derive(Debug, Clone)]
pub struct ModuleView {
    /// Module name.
    pub name: String,
    /// YANG revision date, or empty if none.
    pub revision: String,
    /// Whether replay support is currently enabled.
    pub replay_support: bool,
    /// Enabled feature names.
    pub enabled_features: Vec<String>,
    /// This module's dependencies on other modules.
    pub deps: Vec<DepView>,
    /// Names of modules that depend on this one.
    pub inverse_deps: Vec<String>,
    /// RPCs, as `(xpath, input deps, output deps)`.
    pub rpcs: Vec<(String, Vec<DepView>, Vec<DepView>)>,
    /// Notifications, as `(xpath, deps)`.
    pub notifications: Vec<(String, Vec<DepView>)>,
}

/// Read back module `idx` as an owned [`ModuleView`].
pub fn view_module(arena: &Arena, idx: usize) -> RegistryResult<ModuleView> {
    let rec = module_ref(arena, idx)?;
    let name = arena.read_cstr(rec.name)?;
    let revision = {
        let nul = rec.rev.iter().position(|&b| b == 0).unwrap_or(rec.rev.len());
        String::from_utf8_lossy(&rec.rev[..nul]).into_owned()
    };
    let replay_support = rec.replay_supp.load(Ordering::Relaxed) != 0;

    let mut enabled_features = Vec::with_capacity(rec.feat_count as usize);
    for i in 0..rec.feat_count {
        let off_bytes = arena.read_bytes(rec.features + i * 4, 4)?;
        let off = u32::from_ne_bytes(off_bytes.try_into().unwrap());
        enabled_features.push(arena.read_cstr(off)?);
    }

    let deps = read_deps_array(arena, rec.deps, rec.dep_count)?;

    let mut inverse_deps = Vec::with_capacity(rec.inv_dep_count as usize);
    for i in 0..rec.inv_dep_count {
        let off_bytes = arena.read_bytes(rec.inv_deps + i * 4, 4)?;
        let off = u32::from_ne_bytes(off_bytes.try_into().unwrap());
        inverse_deps.push(arena.read_cstr(off)?);
    }

    let mut rpcs = Vec::with_capacity(rec.rpc_count as usize);
    for i in 0..rec.rpc_count {
        let bytes = arena.read_bytes(
            rec.rpcs + i * super::layout::RPC_RECORD_SIZE as u32,
            super::layout::RPC_RECORD_SIZE,
        )?;
        let r: &super::layout::RpcRecord =
            unsafe { &*(bytes.as_ptr() as *const super::layout::RpcRecord) };
        let path = arena.read_cstr(r.path)?;
        let in_deps = read_deps_array(arena, r.in_deps, r.in_dep_count)?;
        let out_deps = read_deps_array(arena, r.out_deps, r.out_dep_count)?;
        rpcs.push((path, in_deps, out_deps));
    }

    let mut notifications = Vec::with_capacity(rec.notif_count as usize);
    for i in 0..rec.notif_count {
        let bytes = arena.read_bytes(
            rec.notifs + i * super::layout::NOTIF_RECORD_SIZE as u32,
            super::layout::NOTIF_RECORD_SIZE,
        )?;
        let n: &super::layout::NotifRecord =
            unsafe { &*(bytes.as_ptr() as *const super::layout::NotifRecord) };
        let path = arena.read_cstr(n.path)?;
        let deps = read_deps_array(arena, n.deps, n.dep_count)?;
        notifications.push((path, deps));
    }

    Ok(ModuleView {
        name,
        revision,
        replay_support,
        enabled_features,
        deps,
        inverse_deps,
        rpcs,
        notifications,
    })
}

/// Find the module named `name`. Public wrapper over the crate-internal
/// linear scan.
pub fn find_module(arena: &Arena, name: &str) -> RegistryResult<usize> {
    find_module_index(arena, name)
}

/// Find the RPC/action at `xpath` (e.g. `/ietf-interfaces:reset`), by
/// resolving the leading module name and scanning its RPC array.
pub fn find_rpc(arena: &Arena, xpath: &str) -> RegistryResult<String> {
    let rest = xpath.strip_prefix('/').ok_or_else(|| {
        RegistryError::InvalArg(format!("rpc xpath '{xpath}' must be absolute"))
    })?;
    let module_name = rest
        .split(':')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            RegistryError::InvalArg(format!("rpc xpath '{xpath}' missing module prefix"))
        })?;
    let idx = find_module_index(arena, module_name)?;
    let rec = module_ref(arena, idx)?;
    for i in 0..rec.rpc_count {
        let bytes = arena.read_bytes(
            rec.rpcs + i * super::layout::RPC_RECORD_SIZE as u32,
            super::layout::RPC_RECORD_SIZE,
        )?;
        let r: &super::layout::RpcRecord =
            unsafe { &*(bytes.as_ptr() as *const super::layout::RpcRecord) };
        if arena.read_cstr(r.path)? == xpath {
            return Ok(xpath.to_string());
        }
    }
    Err(RegistryError::NotFound(format!("rpc '{xpath}'")))
}

/// Enable or disable replay support for one module, or every module when
/// `module_name` is `None`.
pub fn update_replay_support(
    arena: &mut Arena,
    module_name: Option<&str>,
    enable: bool,
) -> RegistryResult<()> {
    let value = enable as u32;
    match module_name {
        Some(name) => {
            let idx = find_module_index(arena, name)?;
            module_mut(arena, idx)?.replay_supp.store(value, Ordering::Relaxed);
        }
        None => {
            let count = header_ref(arena).mod_count as usize;
            for i in 0..count {
                module_mut(arena, i)?.replay_supp.store(value, Ordering::Relaxed);
            }
        }
    }
    Ok(())
}

const NOTIF_SUB_RECORD_SIZE: usize = 12; // cid: u32, sub_id: u32, suspended: u32

fn notif_sub_offset(base: u32, i: u32) -> u32 {
    base + i * NOTIF_SUB_RECORD_SIZE as u32
}

/// One subscriber to a module's notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifSubView {
    /// Connection ID of the subscriber.
    pub cid: u32,
    /// Subscription ID, unique per connection.
    pub sub_id: u32,
    /// Whether delivery to this subscriber is currently suspended.
    pub suspended: bool,
}

/// Register a new notification subscription for `module_name`, appending to
/// its (append-only) notif-sub array.
pub fn register_notif_sub(
    arena: &mut Arena,
    module_name: &str,
    cid: u32,
    sub_id: u32,
) -> RegistryResult<()> {
    let idx = find_module_index(arena, module_name)?;
    let rec = module_ref(arena, idx)?;
    let old_count = rec.notif_sub_count;
    let old_base = rec.notif_subs;

    let shm_end = arena.size();
    let needed = NOTIF_SUB_RECORD_SIZE;
    arena.remap(shm_end + needed)?;

    let new_base = if old_count == 0 {
        shm_end as u32
    } else {
        // Append-only growth: copy the existing array to the new tail so the
        // array stays contiguous, matching the build pipeline's convention.
        let old_bytes = old_count as usize * NOTIF_SUB_RECORD_SIZE;
        let data = arena.read_bytes(old_base, old_bytes)?.to_vec();
        arena.write_bytes(shm_end as u32, &data)?;
        shm_end as u32
    };

    let entry_off = notif_sub_offset(new_base, old_count);
    let mut buf = [0u8; NOTIF_SUB_RECORD_SIZE];
    buf[0..4].copy_from_slice(&cid.to_ne_bytes());
    buf[4..8].copy_from_slice(&sub_id.to_ne_bytes());
    buf[8..12].copy_from_slice(&0u32.to_ne_bytes());
    arena.write_bytes(entry_off, &buf)?;

    let rec = module_mut(arena, idx)?;
    rec.notif_subs = new_base;
    rec.notif_sub_count = old_count + 1;
    Ok(())
}

fn find_notif_sub(
    arena: &Arena,
    rec: &ModuleRecord,
    cid: u32,
    sub_id: u32,
) -> RegistryResult<(u32, bool)> {
    for i in 0..rec.notif_sub_count {
        let off = notif_sub_offset(rec.notif_subs, i);
        let bytes = arena.read_bytes(off, NOTIF_SUB_RECORD_SIZE)?;
        let got_cid = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let got_sub = u32::from_ne_bytes(bytes[4..8].try_into().unwrap());
        if got_cid == cid && got_sub == sub_id {
            let suspended = u32::from_ne_bytes(bytes[8..12].try_into().unwrap()) != 0;
            return Ok((off, suspended));
        }
    }
    Err(RegistryError::NotFound(format!(
        "notification subscription cid={cid} sub_id={sub_id}"
    )))
}

/// Suspend or resume a notification subscription. Redundant transitions
/// (suspending an already-suspended subscription, or vice versa) are
/// rejected as `Unsupported` rather than silently accepted.
pub fn update_notif_suspend(
    arena: &mut Arena,
    module_name: &str,
    cid: u32,
    sub_id: u32,
    suspend: bool,
) -> RegistryResult<()> {
    let idx = find_module_index(arena, module_name)?;
    let rec = module_ref(arena, idx)?;
    let (off, currently_suspended) = find_notif_sub(arena, rec, cid, sub_id)?;
    if currently_suspended == suspend {
        let verb = if suspend { "suspend" } else { "resume" };
        return Err(RegistryError::Unsupported(format!(
            "subscription cid={cid} sub_id={sub_id} is already in the requested state ({verb})"
        )));
    }
    arena.write_bytes(off + 8, &(suspend as u32).to_ne_bytes())
}

/// Read back whether a notification subscription is currently suspended.
pub fn notif_sub_is_suspended(
    arena: &Arena,
    module_name: &str,
    cid: u32,
    sub_id: u32,
) -> RegistryResult<bool> {
    let idx = find_module_index(arena, module_name)?;
    let rec = module_ref(arena, idx)?;
    let (_, suspended) = find_notif_sub(arena, rec, cid, sub_id)?;
    Ok(suspended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::build::store_modules;
    use crate::registry::layout::{SchemaModule, SchemaTree};
    use tempfile::tempdir;

    fn built_arena(tree: &SchemaTree) -> Arena {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main_shm");
        std::mem::forget(dir);
        let mut arena = Arena::create(&path, super::super::layout::HEADER_SIZE, 0o600).unwrap();
        store_modules(&mut arena, tree).unwrap();
        arena
    }

    fn one_module_tree() -> SchemaTree {
        SchemaTree {
            modules: vec![SchemaModule {
                name: "ietf-interfaces".into(),
                revision: "2018-02-20".into(),
                replay_support: false,
                enabled_features: vec![],
                deps: vec![],
                inverse_deps: vec![],
                rpcs: vec![super::super::layout::SchemaRpc {
                    path: "/ietf-interfaces:reset".into(),
                    in_deps: vec![],
                    out_deps: vec![],
                }],
                notifications: vec![],
            }],
        }
    }

    #[test]
    fn find_module_and_view_round_trip() {
        let arena = built_arena(&one_module_tree());
        let idx = find_module(&arena, "ietf-interfaces").unwrap();
        let view = view_module(&arena, idx).unwrap();
        assert_eq!(view.name, "ietf-interfaces");
        assert_eq!(view.revision, "2018-02-20");
        assert!(!view.replay_support);
    }

    #[test]
    fn find_module_missing_is_not_found() {
        let arena = built_arena(&one_module_tree());
        assert!(matches!(
            find_module(&arena, "nope"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn find_rpc_resolves_by_xpath() {
        let arena = built_arena(&one_module_tree());
        let found = find_rpc(&arena, "/ietf-interfaces:reset").unwrap();
        assert_eq!(found, "/ietf-interfaces:reset");
        assert!(find_rpc(&arena, "/ietf-interfaces:missing").is_err());
    }

    #[test]
    fn update_replay_support_toggles_single_module() {
        let mut arena = built_arena(&one_module_tree());
        update_replay_support(&mut arena, Some("ietf-interfaces"), true).unwrap();
        let idx = find_module(&arena, "ietf-interfaces").unwrap();
        assert!(view_module(&arena, idx).unwrap().replay_support);
    }

    #[test]
    fn notif_sub_suspend_resume_round_trip() {
        let mut arena = built_arena(&one_module_tree());
        register_notif_sub(&mut arena, "ietf-interfaces", 7, 1).unwrap();
        assert!(!notif_sub_is_suspended(&arena, "ietf-interfaces", 7, 1).unwrap());

        update_notif_suspend(&mut arena, "ietf-interfaces", 7, 1, true).unwrap();
        assert!(notif_sub_is_suspended(&arena, "ietf-interfaces", 7, 1).unwrap());

        let redundant = update_notif_suspend(&mut arena, "ietf-interfaces", 7, 1, true);
        assert!(matches!(redundant, Err(RegistryError::Unsupported(_))));

        update_notif_suspend(&mut arena, "ietf-interfaces", 7, 1, false).unwrap();
        assert!(!notif_sub_is_suspended(&arena, "ietf-interfaces", 7, 1).unwrap());
    }
}
