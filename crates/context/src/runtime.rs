//! Runtime matrix
//!
//! The matrix is seeded by the caller. Order is kept as given; only
//! duplicates are dropped.

use kiteplan_core::{Bounds, Error, Result, VersionSpec};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// One Ruby version in the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    /// Ruby version
    pub version: VersionSpec,
    /// Failures on this runtime do not fail the build
    pub soft_fail: bool,
}

impl RuntimeConfig {
    /// Create a runtime that must pass
    #[must_use]
    pub const fn new(version: VersionSpec) -> Self {
        Self {
            version,
            soft_fail: false,
        }
    }

    /// Mark failures on this runtime as tolerated
    #[must_use]
    pub const fn with_soft_fail(mut self, soft_fail: bool) -> Self {
        self.soft_fail = soft_fail;
        self
    }

    /// Upstream base image, e.g. `ruby:2.7`
    #[must_use]
    pub fn image(&self) -> String {
        format!("ruby:{}", self.version)
    }

    /// Key used for image tags and step keys, e.g. `ruby-2.7`
    #[must_use]
    pub fn image_key(&self) -> String {
        format!("ruby-{}", self.version)
    }
}

/// Build the matrix for a project from the seeded versions.
///
/// A runtime soft-fails when it is newer than the policy's maximum.
#[must_use]
pub fn build_matrix(seed: &[VersionSpec], bounds: &Bounds) -> Vec<RuntimeConfig> {
    let mut seen = HashSet::new();
    let mut runtimes = Vec::with_capacity(seed.len());

    for version in seed {
        if !seen.insert(version.clone()) {
            warn!(runtime = %version, "Ignoring duplicate runtime in matrix");
            continue;
        }

        let soft_fail = bounds
            .max_runtime
            .as_ref()
            .is_some_and(|max| version > max);
        runtimes.push(RuntimeConfig::new(version.clone()).with_soft_fail(soft_fail));
    }

    runtimes
}

/// Pick the primary runtime: the second-highest version in the matrix.
///
/// # Errors
/// Returns `Error::InsufficientRuntimes` when fewer than two runtimes exist.
pub fn primary(runtimes: &[RuntimeConfig]) -> Result<&RuntimeConfig> {
    if runtimes.len() < 2 {
        return Err(Error::insufficient_runtimes(runtimes.len()));
    }

    let mut sorted: Vec<&RuntimeConfig> = runtimes.iter().collect();
    sorted.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(sorted[sorted.len() - 2])
}
