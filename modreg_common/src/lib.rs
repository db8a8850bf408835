//! Module Registry Common Library
//!
//! Shared constants, configuration loading, and SHM layout primitives used
//! by both the registry crate and any tooling built on top of it.
//!
//! # Module Structure
//!
//! - [`consts`] - layout version, permission bits, datastore enumeration
//! - [`config`] - TOML configuration loading traits and types
//! - [`shm`] - shared memory sizing constants
//! - [`prelude`] - common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use modreg_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod shm;
