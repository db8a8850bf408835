//! On-arena layout: the fixed header, the fixed-size module record, and the
//! Rust-native input type (`SchemaTree`) the build pipeline consumes.
//!
//! Every reference between records is a `u32` byte offset from the arena
//! base. Offset `0` is reserved to mean "absent" for all optional fields;
//! the header itself occupies bytes `[0, HEADER_SIZE)`, so `0` can never be
//! a legitimate payload offset.

use modreg_common::consts::DS_COUNT;
use std::sync::atomic::AtomicU32;

/// Fixed arena header: layout version, cross-process mutexes, ID counters,
/// module count.
#[repr(C)]
pub struct Header {
    /// Layout version; a mismatch against [`modreg_common::consts::SHM_VERSION`]
    /// means the SHM files must be removed and rebuilt.
    pub shm_ver: u32,
    /// Guards lydmods-equivalent bookkeeping (schema install/remove).
    pub lydmods_lock: libc::pthread_mutex_t,
    /// Guards the companion ext-SHM arena's top-level structures.
    pub ext_lock: libc::pthread_mutex_t,
    /// Next connection ID to hand out.
    pub new_cid: AtomicU32,
    /// Next session ID to hand out.
    pub new_sid: AtomicU32,
    /// Next subscription ID to hand out.
    pub new_sub_id: AtomicU32,
    /// Next event-pipe number to hand out.
    pub new_evpipe_num: AtomicU32,
    /// Number of module records following the header.
    pub mod_count: u32,
}

/// Byte size of [`Header`], and the offset of the first module record.
pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// A dependency's kind, as stored in [`DepRecord::dep_type`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// Depends on another module directly by name.
    Ref = 0,
    /// Depends via an instance-identifier default value, optionally scoped
    /// to a module.
    InstId = 1,
}

/// One dependency slot: `{type, module, path}`.
///
/// Invariant: a `Ref` dep has `module != 0, path == 0`; an `InstId` dep has
/// `path != 0` (`module` may be `0`, meaning no default-value module).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DepRecord {
    /// `DepKind` discriminant.
    pub dep_type: u32,
    /// Offset to the target module's `name` field, or `0`.
    pub module: u32,
    /// Offset to the dependency's xpath, or `0`.
    pub path: u32,
}

/// Byte size of one [`DepRecord`].
pub const DEP_RECORD_SIZE: usize = std::mem::size_of::<DepRecord>();

/// One RPC/action descriptor.
#[repr(C)]
pub struct RpcRecord {
    /// Offset to the NUL-terminated RPC/action xpath.
    pub path: u32,
    /// Number of entries in the `in_deps` array.
    pub in_dep_count: u32,
    /// Offset to an `in_dep_count`-length [`DepRecord`] array.
    pub in_deps: u32,
    /// Number of entries in the `out_deps` array.
    pub out_dep_count: u32,
    /// Offset to an `out_dep_count`-length [`DepRecord`] array.
    pub out_deps: u32,
    /// Guards concurrent invocation bookkeeping for this RPC.
    pub lock: libc::pthread_rwlock_t,
}

/// Byte size of one [`RpcRecord`].
pub const RPC_RECORD_SIZE: usize = std::mem::size_of::<RpcRecord>();

/// One notification descriptor.
#[repr(C)]
pub struct NotifRecord {
    /// Offset to the NUL-terminated notification xpath.
    pub path: u32,
    /// Number of entries in the `deps` array.
    pub dep_count: u32,
    /// Offset to a `dep_count`-length [`DepRecord`] array.
    pub deps: u32,
}

/// Byte size of one [`NotifRecord`].
pub const NOTIF_RECORD_SIZE: usize = std::mem::size_of::<NotifRecord>();

/// Fixed-size module record. Variable-length tails (name, features, deps,
/// inverse deps, RPCs, notifications) are referenced by offset.
#[repr(C)]
pub struct ModuleRecord {
    /// Offset to the NUL-terminated module name.
    pub name: u32,
    /// YANG revision date (`YYYY-MM-DD\0`), or all-zero if none.
    pub rev: [u8; 16],
    /// Non-zero when replay support is enabled for this module.
    pub replay_supp: AtomicU32,
    /// Number of entries in the `features` array.
    pub feat_count: u32,
    /// Offset to a `feat_count`-length array of `u32` name offsets.
    pub features: u32,
    /// Number of entries in the `deps` array.
    pub dep_count: u32,
    /// Offset to a `dep_count`-length [`DepRecord`] array.
    pub deps: u32,
    /// Number of entries in the `inv_deps` array.
    pub inv_dep_count: u32,
    /// Offset to an `inv_dep_count`-length array of `u32` name offsets.
    pub inv_deps: u32,
    /// Number of entries in the `rpcs` array.
    pub rpc_count: u32,
    /// Offset to an `rpc_count`-length [`RpcRecord`] array.
    pub rpcs: u32,
    /// Number of entries in the `notifs` array.
    pub notif_count: u32,
    /// Offset to a `notif_count`-length [`NotifRecord`] array.
    pub notifs: u32,
    /// Per-datastore content rwlocks, indexed by [`modreg_common::consts::Datastore`].
    pub data_lock_info: [libc::pthread_rwlock_t; DS_COUNT],
    /// Guards replay-buffer access for this module.
    pub replay_lock: libc::pthread_rwlock_t,
    /// Per-datastore change-subscription rwlocks.
    pub change_sub: [libc::pthread_rwlock_t; DS_COUNT],
    /// Guards operational-datastore push access.
    pub oper_lock: libc::pthread_rwlock_t,
    /// Guards the notification-subscription array below.
    pub notif_lock: libc::pthread_rwlock_t,
    /// Monotonically increasing content version, bumped on every write.
    pub ver: AtomicU32,
    /// Offset to a `notif_sub_count`-length array of notif-sub entries.
    pub notif_subs: u32,
    /// Number of entries in the `notif_subs` array.
    pub notif_sub_count: u32,
}

/// Byte size of one [`ModuleRecord`].
pub const MODULE_RECORD_SIZE: usize = std::mem::size_of::<ModuleRecord>();

/// Offset of the first module record, immediately after the header.
pub const MODULES_OFFSET: usize = HEADER_SIZE;

/// Byte offset of the Nth module record.
pub fn module_offset(index: usize) -> usize {
    MODULES_OFFSET + index * MODULE_RECORD_SIZE
}

// ─── Schema tree: the boundary input type the schema parser produces ──────

/// A dependency as produced by the schema parser.
#[derive(Debug, Clone)]
pub struct SchemaDep {
    /// Whether this is a direct module reference or an instance-identifier default.
    pub kind: DepKind,
    /// Target module name (required for `Ref`, optional default for `InstId`).
    pub module: Option<String>,
    /// xpath (required for `InstId`, absent for `Ref`).
    pub path: Option<String>,
}

/// An RPC/action as produced by the schema parser.
#[derive(Debug, Clone)]
pub struct SchemaRpc {
    /// Absolute schema-node xpath, e.g. `/ietf-interfaces:reset`.
    pub path: String,
    /// Dependencies of the RPC's input node.
    pub in_deps: Vec<SchemaDep>,
    /// Dependencies of the RPC's output node.
    pub out_deps: Vec<SchemaDep>,
}

/// A notification as produced by the schema parser.
#[derive(Debug, Clone)]
pub struct SchemaNotif {
    /// Absolute schema-node xpath.
    pub path: String,
    /// Dependencies of the notification's payload.
    pub deps: Vec<SchemaDep>,
}

/// A module as produced by the schema parser.
#[derive(Debug, Clone)]
pub struct SchemaModule {
    /// Module name.
    pub name: String,
    /// YANG revision date, or empty if none.
    pub revision: String,
    /// Whether replay support should be enabled for this module.
    pub replay_support: bool,
    /// Enabled feature names.
    pub enabled_features: Vec<String>,
    /// This module's dependencies on other modules.
    pub deps: Vec<SchemaDep>,
    /// Names of modules that depend on this one.
    pub inverse_deps: Vec<String>,
    /// RPCs/actions defined by this module.
    pub rpcs: Vec<SchemaRpc>,
    /// Notifications defined by this module.
    pub notifications: Vec<SchemaNotif>,
}

/// The whole catalog the schema parser hands to [`crate::registry::build::store_modules`].
#[derive(Debug, Clone, Default)]
pub struct SchemaTree {
    /// All modules to build into the registry.
    pub modules: Vec<SchemaModule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_offsets_are_packed_and_non_overlapping() {
        assert_eq!(module_offset(0), HEADER_SIZE);
        assert_eq!(module_offset(1), HEADER_SIZE + MODULE_RECORD_SIZE);
        assert_eq!(module_offset(3) - module_offset(2), MODULE_RECORD_SIZE);
    }

    #[test]
    fn rev_field_holds_a_yang_date() {
        assert!(std::mem::size_of::<[u8; 16]>() > "2020-01-01".len());
    }
}
