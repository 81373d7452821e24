//! Resolved step attributes
//!
//! Field names follow the Buildkite command step so an external serializer
//! can map them one to one.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::LazyLock;

/// Exit status the agent reports when a job is lost
pub const LOST_AGENT_EXIT_STATUS: i32 = -1;

static TASK_NOISE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new("[:_]test|test:").ok());

/// What to run: a rake task in a sub-project, inside a compose service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Sub-project directory, e.g. `activerecord`
    pub subproject: String,
    /// Rake task, e.g. `mysql2:test`
    pub task: String,
    /// Backing docker-compose service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Shell commands run before the task
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_steps: Vec<String>,
}

impl Invocation {
    /// Run the default `test` task of a sub-project
    pub fn new(subproject: impl Into<String>) -> Self {
        Self {
            subproject: subproject.into(),
            task: "test".to_string(),
            service: None,
            pre_steps: Vec::new(),
        }
    }

    /// Display label: the sub-project, plus the task with its `test` noise removed
    #[must_use]
    pub fn label(&self) -> String {
        if self.task == "test" {
            return self.subproject.clone();
        }
        let task = TASK_NOISE
            .as_ref()
            .map_or_else(|| self.task.clone(), |re| re.replacen(&self.task, 1, "").into_owned());
        format!("{} {}", self.subproject, task)
    }

    /// Shell command run in the container
    #[must_use]
    pub fn command(&self) -> String {
        format!("rake {}", self.task)
    }
}

/// Automatic retry rule honored by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutomaticRetry {
    /// Exit status that triggers a retry
    pub exit_status: i32,
    /// Maximum number of retries
    pub limit: u32,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Automatic retry rules
    pub automatic: Vec<AutomaticRetry>,
}

impl RetryPolicy {
    /// Retry up to `limit` times on `exit_status`
    #[must_use]
    pub fn on_exit(exit_status: i32, limit: u32) -> Self {
        Self {
            automatic: vec![AutomaticRetry { exit_status, limit }],
        }
    }
}

/// A fully resolved step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepAttrs {
    /// Display label
    pub label: String,

    /// Unique key for `depends_on` references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Command to run; plugin-driven steps have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Keys of steps that must finish first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Agent queue
    pub queue: String,

    /// Environment variables for this step
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Retry configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Failure does not fail the build
    pub soft_fail: bool,

    /// Number of parallel shards; unset runs serially
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<NonZeroU32>,

    /// Timeout in minutes
    pub timeout_in_minutes: u32,

    /// Plugin references, e.g. `docker-compose#v3.7.0`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,

    /// Artifact globs to upload
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifact_paths: Vec<String>,

    /// Task invocation forwarded to the executor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<Invocation>,
}

impl StepAttrs {
    /// Create a step with the given label and queue and nothing else set
    pub fn new(label: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: None,
            command: None,
            depends_on: Vec::new(),
            queue: queue.into(),
            env: BTreeMap::new(),
            retry: None,
            soft_fail: false,
            parallelism: None,
            timeout_in_minutes: 0,
            plugins: Vec::new(),
            artifact_paths: Vec::new(),
            invocation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(subproject: &str, task: &str) -> Invocation {
        Invocation {
            task: task.to_string(),
            ..Invocation::new(subproject)
        }
    }

    #[test]
    fn test_label_for_default_task() {
        assert_eq!(Invocation::new("actionpack").label(), "actionpack");
    }

    #[test]
    fn test_label_strips_test_noise() {
        assert_eq!(invocation("activerecord", "mysql2:test").label(), "activerecord mysql2");
        assert_eq!(invocation("actioncable", "test:integration").label(), "actioncable integration");
        assert_eq!(
            invocation("activerecord", "sqlite3_mem:test").label(),
            "activerecord sqlite3_mem"
        );
        assert_eq!(
            invocation("activerecord", "postgresql:isolated_test").label(),
            "activerecord postgresql:isolated"
        );
        assert_eq!(invocation("actionmailer", "test:isolated").label(), "actionmailer isolated");
    }

    #[test]
    fn test_command() {
        assert_eq!(invocation("actionview", "test:ujs").command(), "rake test:ujs");
    }

    #[test]
    fn test_retry_serialization() {
        let retry = RetryPolicy::on_exit(LOST_AGENT_EXIT_STATUS, 3);
        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"automatic": [{"exit_status": -1, "limit": 3}]})
        );
    }

    #[test]
    fn test_step_serialization_skips_unset() {
        let step = StepAttrs::new("guides", "default");
        let json = serde_json::to_value(&step).unwrap();
        assert!(json.get("parallelism").is_none());
        assert!(json.get("env").is_none());
        assert_eq!(json["soft_fail"], false);
    }
}
