//! Toolchain policy by project version
//!
//! Older Rails releases only build on a narrow window of Ruby, Bundler and
//! RubyGems versions. The window is an ordered threshold table: the first row
//! whose threshold is strictly greater than the project version applies, and
//! the fallback row covers everything newer.

use crate::version::VersionSpec;
use serde::Serialize;

/// Toolchain constraints for one project version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bounds {
    /// Newest runtime expected to pass; newer runtimes soft-fail. `None` is unbounded.
    pub max_runtime: Option<VersionSpec>,
    /// Bundler requirement installed into images, if pinned
    pub packager_bound: Option<String>,
    /// RubyGems version installed into images, if pinned
    pub registry_pin: Option<String>,
}

struct PolicyRow {
    below: &'static [u64],
    max_runtime: Option<&'static [u64]>,
    packager_bound: Option<&'static str>,
    registry_pin: Option<&'static str>,
}

impl PolicyRow {
    fn bounds(&self) -> Bounds {
        Bounds {
            max_runtime: self.max_runtime.map(VersionSpec::release),
            packager_bound: self.packager_bound.map(str::to_string),
            registry_pin: self.registry_pin.map(str::to_string),
        }
    }
}

const POLICY: &[PolicyRow] = &[
    PolicyRow {
        below: &[5, 0],
        max_runtime: Some(&[2, 4]),
        packager_bound: Some("< 2"),
        registry_pin: Some("2.6.13"),
    },
    PolicyRow {
        below: &[5, 1],
        max_runtime: Some(&[2, 4]),
        packager_bound: Some("< 2.2.10"),
        registry_pin: Some("3.2.9"),
    },
    PolicyRow {
        below: &[5, 2],
        max_runtime: Some(&[2, 5]),
        packager_bound: Some("< 2.2.10"),
        registry_pin: Some("3.2.9"),
    },
    PolicyRow {
        below: &[6, 0],
        max_runtime: Some(&[2, 6]),
        packager_bound: Some("< 2.2.10"),
        registry_pin: Some("3.2.9"),
    },
    PolicyRow {
        below: &[6, 1],
        max_runtime: Some(&[2, 7]),
        packager_bound: Some("< 2.2.10"),
        registry_pin: Some("3.2.9"),
    },
];

const FALLBACK: PolicyRow = PolicyRow {
    below: &[],
    max_runtime: None,
    packager_bound: None,
    registry_pin: None,
};

/// Resolve the toolchain bounds for a project version.
///
/// A version equal to a threshold belongs to the next row up.
#[must_use]
pub fn resolve_bounds(version: &VersionSpec) -> Bounds {
    POLICY
        .iter()
        .find(|row| *version < VersionSpec::release(row.below))
        .unwrap_or(&FALLBACK)
        .bounds()
}

/// The explicit thresholds, ascending
#[must_use]
pub fn thresholds() -> Vec<VersionSpec> {
    POLICY
        .iter()
        .map(|row| VersionSpec::release(row.below))
        .collect()
}
