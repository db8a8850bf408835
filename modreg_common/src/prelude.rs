//! Prelude module for common re-exports.
//!
//! Lets consumers do `use modreg_common::prelude::*;` and get the most
//! commonly used types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use modreg_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, RegistryConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{Datastore, DIR_PERM, DS_COUNT, FILE_PERM, SHM_VERSION};

// ─── SHM sizing ─────────────────────────────────────────────────────
pub use crate::shm::consts::{CACHE_LINE_SIZE, SHM_MAX_SIZE, SHM_MIN_SIZE};
