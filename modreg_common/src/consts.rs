//! System-wide constants for the module registry workspace.
//!
//! Single source of truth for layout versioning, permission bits, and
//! datastore enumeration. Imported by all crates — no duplication permitted.

/// Layout version of the main SHM arena. Bumped whenever the header or
/// module record layout changes incompatibly; `main_open` refuses to
/// attach to an arena whose stored version differs from this one.
pub const SHM_VERSION: u32 = 1;

/// Directory permission bits (before umask is applied): `0777`.
pub const DIR_PERM: u32 = 0o777;

/// Regular file permission bits (before umask is applied): `0666`.
pub const FILE_PERM: u32 = 0o666;

/// Datastores tracked per module. Order is significant: it is the index
/// used into each module record's per-datastore lock arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Datastore {
    /// Persisted configuration, applied at startup.
    Startup = 0,
    /// The datastore actually in effect.
    Running = 1,
    /// Operational/state data, not persisted.
    Operational = 2,
}

/// Number of datastores enumerated by [`Datastore`].
pub const DS_COUNT: usize = 3;

impl Datastore {
    /// All datastore kinds, in index order.
    pub const ALL: [Datastore; DS_COUNT] = [Datastore::Startup, Datastore::Running, Datastore::Operational];

    /// Filename suffix used for this datastore's on-disk file.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Datastore::Startup => "startup",
            Datastore::Running => "running",
            Datastore::Operational => "operational",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datastore_indices_match_declaration_order() {
        assert_eq!(Datastore::Startup as usize, 0);
        assert_eq!(Datastore::Running as usize, 1);
        assert_eq!(Datastore::Operational as usize, 2);
        assert_eq!(Datastore::ALL.len(), DS_COUNT);
    }

    #[test]
    fn file_suffixes_are_distinct() {
        let suffixes: Vec<&str> = Datastore::ALL.iter().map(|d| d.file_suffix()).collect();
        let mut sorted = suffixes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), suffixes.len());
    }
}
