//! Step rules
//!
//! A rule is plain data: an invocation, a guard, a failure policy, optional
//! parallelism and a list of labelled variants. Nothing here holds a callback,
//! so every rule set can be inspected and tested without running it.

use crate::attrs::Invocation;
use kiteplan_context::{BuildContext, FileProbe, RuntimeConfig};
use kiteplan_core::{Result, VersionSpec};
use std::num::NonZeroU32;
use std::path::PathBuf;

/// Guard deciding whether a rule or variant emits a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Always emit
    Always,
    /// Only on the primary runtime
    PrimaryRuntime,
    /// Only when the project version is at least this
    VersionAtLeast(VersionSpec),
    /// Only when the project version is below this
    VersionBelow(VersionSpec),
    /// Only when a project file contains a marker
    FileContains {
        /// Path relative to the project root
        path: PathBuf,
        /// Marker text
        needle: String,
    },
    /// All of the inner conditions hold
    All(Vec<Condition>),
}

impl Condition {
    /// Guard on a project file containing `needle`
    pub fn file_contains(path: impl Into<PathBuf>, needle: impl Into<String>) -> Self {
        Self::FileContains {
            path: path.into(),
            needle: needle.into(),
        }
    }

    /// Evaluate for one runtime.
    ///
    /// # Errors
    /// Returns `Error::InsufficientRuntimes` when a primary-runtime guard is
    /// evaluated without a primary runtime, or `Error::Io` from the probe.
    pub fn holds(
        &self,
        context: &BuildContext,
        runtime: &RuntimeConfig,
        probe: &dyn FileProbe,
    ) -> Result<bool> {
        match self {
            Self::Always => Ok(true),
            Self::PrimaryRuntime => Ok(context.primary_runtime()?.version == runtime.version),
            Self::VersionAtLeast(version) => Ok(context.project_version() >= version),
            Self::VersionBelow(version) => Ok(context.project_version() < version),
            Self::FileContains { path, needle } => probe.contains(path, needle),
            Self::All(conditions) => {
                for condition in conditions {
                    if !condition.holds(context, runtime, probe)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// How a step treats failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the runtime's soft-fail setting and the default retry
    Inherit,
    /// Tolerate failure
    SoftFail,
    /// Replace the default retry with a retry on `exit_status`
    RetryOn {
        /// Exit status that triggers a retry
        exit_status: i32,
        /// Maximum number of retries
        limit: u32,
    },
    /// Pick a policy by condition
    When {
        /// Guard
        condition: Condition,
        /// Policy when the guard holds
        then: Box<FailurePolicy>,
        /// Policy otherwise
        otherwise: Box<FailurePolicy>,
    },
}

/// A failure policy with every condition decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFailure {
    /// Keep the defaults
    Inherit,
    /// Tolerate failure
    SoftFail,
    /// Retry on an exit status
    RetryOn {
        /// Exit status that triggers a retry
        exit_status: i32,
        /// Maximum number of retries
        limit: u32,
    },
}

impl FailurePolicy {
    /// Soft-fail when `condition` holds, otherwise inherit
    #[must_use]
    pub fn soft_fail_when(condition: Condition) -> Self {
        Self::When {
            condition,
            then: Box::new(Self::SoftFail),
            otherwise: Box::new(Self::Inherit),
        }
    }

    /// Decide the policy for one runtime.
    ///
    /// # Errors
    /// Propagates errors from evaluating conditions.
    pub fn resolve(
        &self,
        context: &BuildContext,
        runtime: &RuntimeConfig,
        probe: &dyn FileProbe,
    ) -> Result<ResolvedFailure> {
        match self {
            Self::Inherit => Ok(ResolvedFailure::Inherit),
            Self::SoftFail => Ok(ResolvedFailure::SoftFail),
            Self::RetryOn { exit_status, limit } => Ok(ResolvedFailure::RetryOn {
                exit_status: *exit_status,
                limit: *limit,
            }),
            Self::When {
                condition,
                then,
                otherwise,
            } => {
                if condition.holds(context, runtime, probe)? {
                    then.resolve(context, runtime, probe)
                } else {
                    otherwise.resolve(context, runtime, probe)
                }
            }
        }
    }
}

/// Environment value, possibly chosen by project version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// Fixed value
    Literal(String),
    /// `older` below `below`, `newer` otherwise
    ByVersion {
        /// Threshold
        below: VersionSpec,
        /// Value for versions below the threshold
        older: String,
        /// Value for the threshold and above
        newer: String,
    },
}

impl EnvValue {
    /// Pick the value for a project version
    #[must_use]
    pub fn resolve(&self, project_version: &VersionSpec) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::ByVersion {
                below,
                older,
                newer,
            } => {
                if project_version < below {
                    older.clone()
                } else {
                    newer.clone()
                }
            }
        }
    }
}

/// Fan a step out into shards when the project opts in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parallelism {
    /// Number of shards
    pub shards: NonZeroU32,
    /// File that must mention the marker, relative to the project root
    pub path: PathBuf,
    /// Marker text
    pub needle: String,
}

/// A labelled re-run of a rule's task with overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Appended to the label as ` [tag]`
    pub tag: String,
    /// Guard for this variant
    pub condition: Condition,
    /// Replaces the rule's pre-steps when set
    pub pre_steps: Option<Vec<String>>,
    /// Environment overrides
    pub env: Vec<(String, EnvValue)>,
    /// Failure policy for this variant
    pub failure: FailurePolicy,
}

impl Variant {
    /// Create a variant that always applies
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            condition: Condition::Always,
            pre_steps: None,
            env: Vec::new(),
            failure: FailurePolicy::Inherit,
        }
    }

    /// Guard the variant
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Replace the pre-steps
    #[must_use]
    pub fn pre_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_steps = Some(steps.into_iter().map(Into::into).collect());
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), EnvValue::Literal(value.into())));
        self
    }

    /// Set an environment variable chosen by project version
    #[must_use]
    pub fn env_by_version(
        mut self,
        key: impl Into<String>,
        below: VersionSpec,
        older: impl Into<String>,
        newer: impl Into<String>,
    ) -> Self {
        self.env.push((
            key.into(),
            EnvValue::ByVersion {
                below,
                older: older.into(),
                newer: newer.into(),
            },
        ));
        self
    }

    /// Tolerate failure of this variant
    #[must_use]
    pub fn soft_fail(mut self) -> Self {
        self.failure = FailurePolicy::SoftFail;
        self
    }
}

/// One candidate step plus its conditional attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRule {
    /// Task to run
    pub invocation: Invocation,
    /// Guard for the base step and, transitively, its variants
    pub condition: Condition,
    /// Failure policy for the base step
    pub failure: FailurePolicy,
    /// Optional fan-out, shared with variants
    pub parallelism: Option<Parallelism>,
    /// Variants emitted right after the base step
    pub variants: Vec<Variant>,
}

impl StepRule {
    /// Rule running `rake test` in a sub-project
    pub fn rake(subproject: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::new(subproject),
            condition: Condition::Always,
            failure: FailurePolicy::Inherit,
            parallelism: None,
            variants: Vec::new(),
        }
    }

    /// Run a different rake task
    #[must_use]
    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.invocation.task = task.into();
        self
    }

    /// Run inside a docker-compose service
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.invocation.service = Some(service.into());
        self
    }

    /// Commands run before the task
    #[must_use]
    pub fn pre_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.pre_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Guard the rule
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn failure(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    /// Retry on `exit_status` up to `limit` times instead of the default retry
    #[must_use]
    pub fn retry_on(self, exit_status: i32, limit: u32) -> Self {
        self.failure(FailurePolicy::RetryOn { exit_status, limit })
    }

    /// Fan out into `shards` when `path` mentions `needle`. Zero shards leaves the step serial.
    #[must_use]
    pub fn parallel(
        mut self,
        shards: u32,
        path: impl Into<PathBuf>,
        needle: impl Into<String>,
    ) -> Self {
        self.parallelism = NonZeroU32::new(shards).map(|shards| Parallelism {
            shards,
            path: path.into(),
            needle: needle.into(),
        });
        self
    }

    /// Add a variant
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }
}
