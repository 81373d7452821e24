//! File probes
//!
//! Some steps only exist, or only fan out, when the project under test has
//! opted in by mentioning a marker in one of its files.

use kiteplan_core::{Error, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Answers "does file F under the project root contain S"
pub trait FileProbe {
    /// Check whether `relative` contains `needle`.
    ///
    /// A missing file reads as not containing the marker.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file exists but cannot be read.
    fn contains(&self, relative: &Path, needle: &str) -> Result<bool>;
}

/// Probe backed by the filesystem
#[derive(Debug, Clone)]
pub struct FsProbe {
    root: PathBuf,
}

impl FsProbe {
    /// Create a probe rooted at the project directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileProbe for FsProbe {
    fn contains(&self, relative: &Path, needle: &str) -> Result<bool> {
        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content.contains(needle)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Probe target missing, treating marker as absent");
                Ok(false)
            }
            Err(e) => Err(Error::io(path, e.to_string())),
        }
    }
}

/// Probe over in-memory file contents, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    files: HashMap<PathBuf, String>,
}

impl MemoryProbe {
    /// Create an empty probe
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file
    #[must_use]
    pub fn with_file(mut self, relative: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(relative.into(), content.into());
        self
    }
}

impl FileProbe for MemoryProbe {
    fn contains(&self, relative: &Path, needle: &str) -> Result<bool> {
        Ok(self
            .files
            .get(relative)
            .is_some_and(|content| content.contains(needle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_probe_finds_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("railties")).unwrap();
        std::fs::write(
            dir.path().join("railties/Rakefile"),
            "task :test do\n  ENV['BUILDKITE_PARALLEL']\nend\n",
        )
        .unwrap();

        let probe = FsProbe::new(dir.path());
        let rakefile = Path::new("railties/Rakefile");
        assert!(probe.contains(rakefile, "BUILDKITE_PARALLEL").unwrap());
        assert!(!probe.contains(rakefile, "task :ujs").unwrap());
    }

    #[test]
    fn test_fs_probe_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FsProbe::new(dir.path());
        assert!(!probe
            .contains(Path::new("actionview/Rakefile"), "task :ujs")
            .unwrap());
    }

    #[test]
    fn test_fs_probe_unreadable_target_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("activerecord/Rakefile")).unwrap();

        let probe = FsProbe::new(dir.path());
        let result = probe.contains(Path::new("activerecord/Rakefile"), "BUILDKITE_PARALLEL");
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_memory_probe() {
        let probe = MemoryProbe::new().with_file("actionview/Rakefile", "task :ujs do\nend");
        assert!(probe
            .contains(Path::new("actionview/Rakefile"), "task :ujs")
            .unwrap());
        assert!(!probe
            .contains(Path::new("railties/Rakefile"), "BUILDKITE_PARALLEL")
            .unwrap());
    }
}
