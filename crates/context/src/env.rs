//! Environment snapshot
//!
//! The build context never reads the process environment directly. It is
//! captured once, so a variable changing mid-run cannot change the plan.

use kiteplan_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Set to `true` by Buildkite agents
pub const BUILDKITE: &str = "BUILDKITE";
/// Generic CI flag
pub const CI: &str = "CI";
/// Buildkite pipeline slug name
pub const PIPELINE_NAME: &str = "BUILDKITE_PIPELINE_NAME";
/// Build id assigned by Buildkite
pub const BUILDKITE_BUILD_ID: &str = "BUILDKITE_BUILD_ID";
/// Generic build id override
pub const BUILD_ID: &str = "BUILD_ID";
/// Queue the current agent was started on
pub const AGENT_QUEUE: &str = "BUILDKITE_AGENT_META_DATA_QUEUE";
/// Queue override for image builds
pub const BUILD_QUEUE: &str = "BUILD_QUEUE";
/// Queue override for test steps
pub const RUN_QUEUE: &str = "RUN_QUEUE";
/// Image repository override
pub const DOCKER_IMAGE: &str = "DOCKER_IMAGE";

const KNOWN_KEYS: [&str; 9] = [
    BUILDKITE,
    CI,
    PIPELINE_NAME,
    BUILDKITE_BUILD_ID,
    BUILD_ID,
    AGENT_QUEUE,
    BUILD_QUEUE,
    RUN_QUEUE,
    DOCKER_IMAGE,
];

/// Immutable copy of the variables kiteplan reads, plus the working directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl EnvSnapshot {
    /// Capture the current process environment and working directory.
    ///
    /// # Errors
    /// Returns `Error::Io` if the working directory cannot be determined.
    pub fn capture() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| Error::io(".", e.to_string()))?;
        let vars = KNOWN_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value)));
        Ok(Self::from_vars(cwd, vars))
    }

    /// Build a snapshot from explicit values
    pub fn from_vars<I, K, V>(cwd: impl Into<PathBuf>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            cwd: cwd.into(),
        }
    }

    /// Look up a variable. Empty values read as unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Whether a variable is present, even if empty
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Working directory at capture time
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_reads_as_unset() {
        let env = EnvSnapshot::from_vars("/work", [(BUILD_ID, ""), (RUN_QUEUE, "ci")]);
        assert_eq!(env.get(BUILD_ID), None);
        assert_eq!(env.get(RUN_QUEUE), Some("ci"));
        assert_eq!(env.get(BUILD_QUEUE), None);
    }

    #[test]
    fn test_empty_value_is_still_set() {
        let env = EnvSnapshot::from_vars("/work", [(CI, "")]);
        assert!(env.is_set(CI));
        assert_eq!(env.get(CI), None);
        assert!(!env.is_set(BUILDKITE));
    }

    #[test]
    fn test_capture_keeps_empty_ci_flag() {
        temp_env::with_vars([(CI, Some("")), (BUILDKITE, None)], || {
            let env = EnvSnapshot::capture().unwrap();
            assert!(env.is_set(CI));
            assert!(!env.is_set(BUILDKITE));
        });
    }

    #[test]
    fn test_capture_reads_known_keys_only() {
        temp_env::with_vars(
            [
                (RUN_QUEUE, Some("capture-queue")),
                ("KITEPLAN_UNRELATED", Some("ignored")),
            ],
            || {
                let env = EnvSnapshot::capture().unwrap();
                assert_eq!(env.get(RUN_QUEUE), Some("capture-queue"));
                assert_eq!(env.get("KITEPLAN_UNRELATED"), None);
            },
        );
    }

    #[test]
    fn test_snapshot_does_not_drift() {
        temp_env::with_vars([(BUILD_QUEUE, Some("before"))], || {
            let env = EnvSnapshot::capture().unwrap();
            temp_env::with_vars([(BUILD_QUEUE, Some("after"))], || {
                assert_eq!(env.get(BUILD_QUEUE), Some("before"));
            });
        });
    }
}
