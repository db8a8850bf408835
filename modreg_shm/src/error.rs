//! Error types for the module registry.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A nil/empty/out-of-range argument was passed.
    #[error("invalid argument: {0}")]
    InvalArg(String),

    /// Allocation failure (`mmap`/`ftruncate`/growth).
    #[error("out of memory: {0}")]
    NoMem(String),

    /// An unexpected errno from a syscall.
    #[error("system error in {syscall}: {source}")]
    System {
        /// Name of the failing syscall.
        syscall: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A file or entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal invariant was violated — indicates a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Version mismatch, or an operation unsupported in the current state.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Operation failed due to invalid state (nil arena, missing xpath, …).
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The entity already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// A lock/mutex acquisition exceeded its configured timeout.
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl From<std::io::Error> for RegistryError {
    fn from(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => RegistryError::NotFound(source.to_string()),
            std::io::ErrorKind::AlreadyExists => RegistryError::Exists(source.to_string()),
            _ => RegistryError::System {
                syscall: "io",
                source,
            },
        }
    }
}

impl From<nix::Error> for RegistryError {
    fn from(source: nix::Error) -> Self {
        match source {
            nix::Error::ENOENT => RegistryError::NotFound(source.to_string()),
            nix::Error::EEXIST => RegistryError::Exists(source.to_string()),
            _ => RegistryError::System {
                syscall: "nix",
                source: std::io::Error::from(source),
            },
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
