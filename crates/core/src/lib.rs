//! Core types for kiteplan
//!
//! This crate holds the pieces every other kiteplan crate builds on:
//!
//! - [`VersionSpec`]: RubyGems-style version ordering, including prerelease segments
//! - [`policy`]: the threshold table mapping a project version to toolchain bounds
//! - [`Error`]: configuration errors that abort plan generation

pub mod error;
pub mod policy;
pub mod version;

pub use error::{Error, Result};
pub use policy::{Bounds, resolve_bounds};
pub use version::VersionSpec;
