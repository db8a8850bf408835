//! # Module Registry Shared Memory
//!
//! A process-shared, memory-mapped registry of installed configuration
//! modules (the Main Shared-Memory Registry, "MSR") plus a Connection
//! Liveness Tracker ("CLT") for detecting dead client connections across
//! process crashes.
//!
//! ## Layout
//!
//! - [`arena`] — the growable `mmap` region and its offset-addressed byte
//!   accessors.
//! - [`sync`] — process-shared `pthread_mutex_t`/`pthread_rwlock_t`
//!   primitives embedded directly in the arena.
//! - [`lockfile`] — whole-file `fcntl` advisory locking, shared by the
//!   create-lock and the CLT.
//! - [`paths`] — filesystem layout (directories, permissions, umask).
//! - [`bootstrap`] — create-lock acquisition and `main_open`.
//! - [`registry`] — the MSR itself: on-arena layout, the three-stage build
//!   pipeline, and lookups/mutations.
//! - [`clt`] — the Connection Liveness Tracker.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use modreg_common::config::RegistryConfig;
//! use modreg_shm::{bootstrap, registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::default();
//! let _lock = bootstrap::CreateLock::acquire(&config)?;
//! let mut arena = bootstrap::main_open(&config)?;
//!
//! let tree = registry::layout::SchemaTree::default();
//! registry::build::store_modules(&mut arena, &tree)?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod bootstrap;
pub mod clt;
pub mod error;
pub mod lockfile;
pub mod paths;
pub mod platform;
pub mod registry;
pub mod sync;

pub use error::{RegistryError, RegistryResult};

/// Initialize tracing for registry diagnostics.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
