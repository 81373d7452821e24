//! Build context resolution
//!
//! Everything here is derived from an [`EnvSnapshot`] and the project version.
//! Construction is the only step that touches the filesystem.

use crate::env::{self, EnvSnapshot};
use crate::runtime::{self, RuntimeConfig};
use kiteplan_core::{Bounds, Error, Result, VersionSpec, resolve_bounds};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pipeline name under which the working directory is the project checkout
pub const PIPELINE_IDENTITY: &str = "rails-ci";
/// Where a local run expects its fetched copy of the project
pub const SCRATCH_ROOT: &str = "tmp/rails";
/// Version marker file, relative to the project root
pub const VERSION_FILE: &str = "RAILS_VERSION";
/// Container registry holding built images
pub const REGISTRY: &str = "973266071021.dkr.ecr.us-east-1.amazonaws.com";
/// Queues shared by every pipeline
pub const STANDARD_QUEUES: [&str; 2] = ["default", "builder"];
/// Default queue for image builds
pub const DEFAULT_BUILD_QUEUE: &str = "builder";
/// Default queue for test steps
pub const DEFAULT_RUN_QUEUE: &str = "default";

const DOCKER_COMPOSE_PLUGIN: &str = "docker-compose#v3.7.0";
const ARTIFACTS_PLUGIN: &str = "artifacts#v1.2.0";

/// Resolved parameters for one plan generation run
#[derive(Debug, Clone)]
pub struct BuildContext {
    env: EnvSnapshot,
    project_root: PathBuf,
    project_version: VersionSpec,
    bounds: Bounds,
    runtimes: Vec<RuntimeConfig>,
}

impl BuildContext {
    /// Resolve the context, reading the project version from disk.
    ///
    /// # Errors
    /// Returns `Error::MissingVersionFile` if the version file does not exist,
    /// `Error::Io` if it cannot be read, or `Error::InvalidVersion` if its
    /// content is not a version literal.
    pub fn load(snapshot: EnvSnapshot, seed: &[VersionSpec]) -> Result<Self> {
        let root = project_root_for(&snapshot);
        let path = root.join(VERSION_FILE);
        debug!(path = %path.display(), "Reading project version");

        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::missing_version_file(&path)
            } else {
                Error::io(&path, e.to_string())
            }
        })?;
        let version = VersionSpec::parse(&text)?;

        Ok(Self::new(snapshot, version, seed))
    }

    /// Resolve the context for a known project version
    #[must_use]
    pub fn new(snapshot: EnvSnapshot, project_version: VersionSpec, seed: &[VersionSpec]) -> Self {
        let project_root = project_root_for(&snapshot);
        let bounds = resolve_bounds(&project_version);
        let runtimes = runtime::build_matrix(seed, &bounds);

        info!(
            project_version = %project_version,
            project_root = %project_root.display(),
            runtimes = runtimes.len(),
            "Resolved build context"
        );

        Self {
            env: snapshot,
            project_root,
            project_version,
            bounds,
            runtimes,
        }
    }

    /// Whether we are running on a CI agent
    #[must_use]
    pub fn is_ci(&self) -> bool {
        is_ci(&self.env)
    }

    /// The Buildkite pipeline name, if any
    #[must_use]
    pub fn pipeline_name(&self) -> Option<&str> {
        self.env.get(env::PIPELINE_NAME)
    }

    /// Root of the project under test
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Version of the project under test
    #[must_use]
    pub const fn project_version(&self) -> &VersionSpec {
        &self.project_version
    }

    /// The runtime matrix, in caller order
    #[must_use]
    pub fn runtimes(&self) -> &[RuntimeConfig] {
        &self.runtimes
    }

    /// The runtime used for one-off variants.
    ///
    /// # Errors
    /// Returns `Error::InsufficientRuntimes` for fewer than two runtimes.
    pub fn primary_runtime(&self) -> Result<&RuntimeConfig> {
        runtime::primary(&self.runtimes)
    }

    /// Whether `runtime` is the primary runtime. False when there is none.
    #[must_use]
    pub fn is_primary(&self, runtime: &RuntimeConfig) -> bool {
        self.primary_runtime()
            .is_ok_and(|primary| primary.version == runtime.version)
    }

    /// Toolchain bounds for the project version
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Newest runtime expected to pass, if bounded
    #[must_use]
    pub const fn max_runtime(&self) -> Option<&VersionSpec> {
        self.bounds.max_runtime.as_ref()
    }

    /// Bundler requirement for images, if pinned
    #[must_use]
    pub fn bundler(&self) -> Option<&str> {
        self.bounds.packager_bound.as_deref()
    }

    /// RubyGems version for images, if pinned
    #[must_use]
    pub fn rubygems(&self) -> Option<&str> {
        self.bounds.registry_pin.as_deref()
    }

    /// Registry path for built images, namespaced by non-standard build queues
    #[must_use]
    pub fn remote_image_base(&self) -> String {
        let queue = self.build_queue();
        if STANDARD_QUEUES.contains(&queue) {
            format!("{REGISTRY}/builds")
        } else {
            format!("{REGISTRY}/{queue}-builds")
        }
    }

    /// Image repository, honouring `DOCKER_IMAGE`
    #[must_use]
    pub fn image_base(&self) -> String {
        self.env
            .get(env::DOCKER_IMAGE)
            .map_or_else(|| self.remote_image_base(), str::to_string)
    }

    /// Full image name built for `runtime` in this build
    #[must_use]
    pub fn image_name_for(&self, runtime: &RuntimeConfig) -> String {
        format!(
            "{}:{}-{}",
            self.image_base(),
            runtime.image_key(),
            self.build_id()
        )
    }

    /// Identifier of this build
    #[must_use]
    pub fn build_id(&self) -> &str {
        self.env
            .get(env::BUILDKITE_BUILD_ID)
            .or_else(|| self.env.get(env::BUILD_ID))
            .unwrap_or(if self.is_ci() { "build_id" } else { "local" })
    }

    /// The agent's queue, unless it is one of the standard queues
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.env
            .get(env::AGENT_QUEUE)
            .filter(|queue| !STANDARD_QUEUES.contains(queue))
    }

    /// Queue for image build steps
    #[must_use]
    pub fn build_queue(&self) -> &str {
        self.env
            .get(env::BUILD_QUEUE)
            .or_else(|| self.queue())
            .unwrap_or(DEFAULT_BUILD_QUEUE)
    }

    /// Queue for test steps
    #[must_use]
    pub fn run_queue(&self) -> &str {
        self.env
            .get(env::RUN_QUEUE)
            .or_else(|| self.queue())
            .unwrap_or(DEFAULT_RUN_QUEUE)
    }

    /// Pinned docker-compose plugin reference
    #[must_use]
    pub fn docker_compose_plugin(&self) -> &'static str {
        DOCKER_COMPOSE_PLUGIN
    }

    /// Pinned artifacts plugin reference
    #[must_use]
    pub fn artifacts_plugin(&self) -> &'static str {
        ARTIFACTS_PLUGIN
    }
}

fn is_ci(snapshot: &EnvSnapshot) -> bool {
    snapshot.is_set(env::BUILDKITE) || snapshot.is_set(env::CI)
}

fn project_root_for(snapshot: &EnvSnapshot) -> PathBuf {
    if is_ci(snapshot) && snapshot.get(env::PIPELINE_NAME) == Some(PIPELINE_IDENTITY) {
        snapshot.cwd().to_path_buf()
    } else {
        snapshot.cwd().join(SCRATCH_ROOT)
    }
}
