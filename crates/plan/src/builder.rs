//! Plan builder
//!
//! Walks the runtime matrix and a rule set and produces ordered groups of
//! resolved steps. Every step is built from scratch, so overrides on one step
//! never reach its siblings.
//!
//! # Step resolution order
//!
//! 1. Base attributes from the invocation and runtime
//! 2. Rule guard; skipped rules emit nothing
//! 3. Base step, then each variant whose own guard holds
//! 4. Failure policy (retry or soft-fail), then parallelism

use crate::attrs::{Invocation, LOST_AGENT_EXIT_STATUS, RetryPolicy, StepAttrs};
use crate::rule::{FailurePolicy, Parallelism, ResolvedFailure, StepRule, Variant};
use kiteplan_context::{BuildContext, FileProbe, RuntimeConfig};
use kiteplan_core::Result;
use serde::Serialize;
use std::num::NonZeroU32;
use tracing::{debug, info};

/// Retries granted to every step when an agent is lost
pub const DEFAULT_RETRY_LIMIT: u32 = 2;
/// Timeout for test steps
pub const TEST_TIMEOUT_MINUTES: u32 = 30;
/// Timeout for image build steps
pub const BUILD_TIMEOUT_MINUTES: u32 = 15;
/// Test report globs uploaded by every test step
pub const ARTIFACT_PATHS: &str = "test-reports/*/*.xml";

/// A labelled group of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Group label
    pub label: String,
    /// Steps in execution and display order
    pub steps: Vec<StepAttrs>,
}

/// The generated plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Groups in declared order
    pub groups: Vec<Group>,
}

impl Plan {
    /// All steps across groups, in order
    pub fn steps(&self) -> impl Iterator<Item = &StepAttrs> {
        self.groups.iter().flat_map(|group| group.steps.iter())
    }

    /// First group with the given label
    #[must_use]
    pub fn group(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.label == label)
    }
}

/// How one declared group expands over the matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// One image build step per runtime, in a single group
    ImageBuilds {
        /// Group label
        label: String,
    },
    /// One group per runtime, labelled by its image
    PerRuntime {
        /// Rules expanded for every runtime
        rules: Vec<StepRule>,
    },
    /// A single group on the primary runtime
    Primary {
        /// Group label
        label: String,
        /// Rules expanded for the primary runtime
        rules: Vec<StepRule>,
    },
}

/// Declared groups, in output order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Group declarations
    pub groups: Vec<GroupSpec>,
}

/// Step key of the image build for `runtime`
#[must_use]
pub fn image_step_key(runtime: &RuntimeConfig) -> String {
    format!("docker-image-{}", runtime.image_key())
}

/// Expands a [`RuleSet`] against a [`BuildContext`]
pub struct PlanBuilder<'a> {
    context: &'a BuildContext,
    probe: &'a dyn FileProbe,
}

impl<'a> PlanBuilder<'a> {
    /// Create a builder; `probe` answers file marker checks under the project root
    pub fn new(context: &'a BuildContext, probe: &'a dyn FileProbe) -> Self {
        Self { context, probe }
    }

    /// Build the plan.
    ///
    /// # Errors
    /// Returns `Error::InsufficientRuntimes` if a primary-runtime group or
    /// guard is used with fewer than two runtimes, or `Error::Io` if a probed
    /// file cannot be read. No partial plan is returned.
    pub fn build(&self, rules: &RuleSet) -> Result<Plan> {
        let mut groups = Vec::new();

        for spec in &rules.groups {
            match spec {
                GroupSpec::ImageBuilds { label } => groups.push(Group {
                    label: label.clone(),
                    steps: self
                        .context
                        .runtimes()
                        .iter()
                        .map(|runtime| self.image_build_step(runtime))
                        .collect(),
                }),
                GroupSpec::PerRuntime { rules } => {
                    for runtime in self.context.runtimes() {
                        groups.push(Group {
                            label: runtime.image(),
                            steps: self.expand(runtime, rules)?,
                        });
                    }
                }
                GroupSpec::Primary { label, rules } => {
                    let runtime = self.context.primary_runtime()?;
                    groups.push(Group {
                        label: label.clone(),
                        steps: self.expand(runtime, rules)?,
                    });
                }
            }
        }

        let plan = Plan { groups };
        info!(
            groups = plan.groups.len(),
            steps = plan.steps().count(),
            "Built plan"
        );
        Ok(plan)
    }

    fn expand(&self, runtime: &RuntimeConfig, rules: &[StepRule]) -> Result<Vec<StepAttrs>> {
        let mut steps = Vec::new();

        for rule in rules {
            if !rule.condition.holds(self.context, runtime, self.probe)? {
                debug!(
                    runtime = %runtime.version,
                    step = %rule.invocation.label(),
                    "Rule guard false, skipping"
                );
                continue;
            }

            let parallelism = self.parallelism(rule.parallelism.as_ref())?;
            let base = self.test_step(runtime, &rule.invocation);
            steps.push(self.apply_policy(base, &rule.failure, parallelism, runtime)?);

            for variant in &rule.variants {
                if !variant.condition.holds(self.context, runtime, self.probe)? {
                    continue;
                }
                let attrs = self.variant_step(runtime, &rule.invocation, variant);
                steps.push(self.apply_policy(attrs, &variant.failure, parallelism, runtime)?);
            }
        }

        Ok(steps)
    }

    fn variant_step(
        &self,
        runtime: &RuntimeConfig,
        invocation: &Invocation,
        variant: &Variant,
    ) -> StepAttrs {
        let mut invocation = invocation.clone();
        if let Some(pre_steps) = &variant.pre_steps {
            invocation.pre_steps.clone_from(pre_steps);
        }

        let mut attrs = self.test_step(runtime, &invocation);
        attrs.label = format!("{} [{}]", attrs.label, variant.tag);
        for (key, value) in &variant.env {
            attrs
                .env
                .insert(key.clone(), value.resolve(self.context.project_version()));
        }
        attrs
    }

    fn test_step(&self, runtime: &RuntimeConfig, invocation: &Invocation) -> StepAttrs {
        let mut attrs = StepAttrs::new(invocation.label(), self.context.run_queue());
        attrs.command = Some(invocation.command());
        attrs.depends_on = vec![image_step_key(runtime)];
        attrs
            .env
            .insert("IMAGE_NAME".to_string(), self.context.image_name_for(runtime));
        if !invocation.pre_steps.is_empty() {
            attrs
                .env
                .insert("PRE_STEPS".to_string(), invocation.pre_steps.join(" && "));
        }
        attrs.retry = Some(RetryPolicy::on_exit(
            LOST_AGENT_EXIT_STATUS,
            DEFAULT_RETRY_LIMIT,
        ));
        attrs.soft_fail = runtime.soft_fail;
        attrs.timeout_in_minutes = TEST_TIMEOUT_MINUTES;
        attrs.plugins = self.plugins();
        attrs.artifact_paths = vec![ARTIFACT_PATHS.to_string()];
        attrs.invocation = Some(invocation.clone());
        attrs
    }

    fn image_build_step(&self, runtime: &RuntimeConfig) -> StepAttrs {
        let mut attrs = StepAttrs::new(
            format!(":docker: {}", runtime.image()),
            self.context.build_queue(),
        );
        attrs.key = Some(image_step_key(runtime));
        attrs.env.insert("RUBY_IMAGE".to_string(), runtime.image());
        attrs
            .env
            .insert("IMAGE_NAME".to_string(), self.context.image_name_for(runtime));
        if let Some(bundler) = self.context.bundler() {
            attrs.env.insert("BUNDLER".to_string(), bundler.to_string());
        }
        if let Some(rubygems) = self.context.rubygems() {
            attrs.env.insert("RUBYGEMS".to_string(), rubygems.to_string());
        }
        attrs.retry = Some(RetryPolicy::on_exit(
            LOST_AGENT_EXIT_STATUS,
            DEFAULT_RETRY_LIMIT,
        ));
        attrs.soft_fail = runtime.soft_fail;
        attrs.timeout_in_minutes = BUILD_TIMEOUT_MINUTES;
        attrs.plugins = self.plugins();
        attrs
    }

    fn plugins(&self) -> Vec<String> {
        vec![
            self.context.artifacts_plugin().to_string(),
            self.context.docker_compose_plugin().to_string(),
        ]
    }

    fn parallelism(&self, parallelism: Option<&Parallelism>) -> Result<Option<NonZeroU32>> {
        let Some(parallelism) = parallelism else {
            return Ok(None);
        };
        let enabled = self.probe.contains(&parallelism.path, &parallelism.needle)?;
        debug!(
            path = %parallelism.path.display(),
            enabled,
            "Probed for parallel support"
        );
        Ok(enabled.then_some(parallelism.shards))
    }

    /// Retry first, then soft-fail, then parallelism.
    fn apply_policy(
        &self,
        mut attrs: StepAttrs,
        failure: &FailurePolicy,
        parallelism: Option<NonZeroU32>,
        runtime: &RuntimeConfig,
    ) -> Result<StepAttrs> {
        match failure.resolve(self.context, runtime, self.probe)? {
            ResolvedFailure::Inherit => {}
            ResolvedFailure::RetryOn { exit_status, limit } => {
                attrs.retry = Some(RetryPolicy::on_exit(exit_status, limit));
            }
            ResolvedFailure::SoftFail => attrs.soft_fail = true,
        }
        attrs.parallelism = parallelism;
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Condition, StepRule, Variant};
    use kiteplan_context::{EnvSnapshot, MemoryProbe};
    use kiteplan_core::{Error, VersionSpec};

    fn v(text: &str) -> VersionSpec {
        VersionSpec::parse(text).unwrap()
    }

    fn context(version: &str, rubies: &[&str]) -> BuildContext {
        let seed: Vec<_> = rubies.iter().map(|r| v(r)).collect();
        let env = EnvSnapshot::from_vars(
            "/work",
            [("BUILDKITE_BUILD_ID", "42"), ("DOCKER_IMAGE", "img")],
        );
        BuildContext::new(env, v(version), &seed)
    }

    fn per_runtime(rules: Vec<StepRule>) -> RuleSet {
        RuleSet {
            groups: vec![GroupSpec::PerRuntime { rules }],
        }
    }

    fn labels(group: &Group) -> Vec<&str> {
        group.steps.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_base_step_attributes() {
        let ctx = context("6.1.0", &["2.7", "3.0"]);
        let probe = MemoryProbe::new();
        let rules = per_runtime(vec![StepRule::rake("actioncable").service("postgresdb")]);

        let plan = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap();
        let step = &plan.groups[0].steps[0];

        assert_eq!(plan.groups[0].label, "ruby:2.7");
        assert_eq!(step.label, "actioncable");
        assert_eq!(step.command.as_deref(), Some("rake test"));
        assert_eq!(step.depends_on, vec!["docker-image-ruby-2.7"]);
        assert_eq!(step.queue, "default");
        assert_eq!(step.env["IMAGE_NAME"], "img:ruby-2.7-42");
        assert!(!step.env.contains_key("PRE_STEPS"));
        assert_eq!(step.retry, Some(RetryPolicy::on_exit(-1, DEFAULT_RETRY_LIMIT)));
        assert_eq!(step.timeout_in_minutes, TEST_TIMEOUT_MINUTES);
        assert_eq!(step.plugins, vec!["artifacts#v1.2.0", "docker-compose#v3.7.0"]);
        assert_eq!(
            step.invocation.as_ref().and_then(|i| i.service.as_deref()),
            Some("postgresdb")
        );
        assert!(step.parallelism.is_none());
    }

    #[test]
    fn test_soft_fail_inherited_from_runtime() {
        let ctx = context("6.0.3", &["2.7", "3.0"]);
        let probe = MemoryProbe::new();
        let plan = PlanBuilder::new(&ctx, &probe)
            .build(&per_runtime(vec![StepRule::rake("guides")]))
            .unwrap();

        assert!(!plan.groups[0].steps[0].soft_fail);
        assert!(plan.groups[1].steps[0].soft_fail);
    }

    #[test]
    fn test_variants_follow_base_step() {
        let ctx = context("6.1.0", &["2.6", "2.7", "3.0"]);
        let probe = MemoryProbe::new();
        let rules = per_runtime(vec![
            StepRule::rake("actionpack")
                .variant(
                    Variant::new("rack-2")
                        .when(Condition::PrimaryRuntime)
                        .pre_steps(["bundle install"])
                        .env("RACK", "~> 2.0"),
                )
                .variant(Variant::new("always").env("EXTRA", "1")),
            StepRule::rake("actiontext"),
        ]);

        let plan = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap();
        assert_eq!(
            labels(&plan.groups[0]),
            vec!["actionpack", "actionpack [always]", "actiontext"]
        );
        assert_eq!(
            labels(&plan.groups[1]),
            vec![
                "actionpack",
                "actionpack [rack-2]",
                "actionpack [always]",
                "actiontext"
            ]
        );

        let rack = &plan.groups[1].steps[1];
        assert_eq!(rack.env["RACK"], "~> 2.0");
        assert_eq!(rack.env["PRE_STEPS"], "bundle install");
    }

    #[test]
    fn test_variant_env_does_not_leak() {
        let ctx = context("6.1.0", &["2.7", "3.0"]);
        let probe = MemoryProbe::new();
        let rules = per_runtime(vec![
            StepRule::rake("activerecord")
                .task("mysql2:test")
                .variant(Variant::new("mysql_5_7").env("MYSQL_IMAGE", "mysql:5.7")),
        ]);

        let plan = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap();
        let steps = &plan.groups[0].steps;
        assert!(!steps[0].env.contains_key("MYSQL_IMAGE"));
        assert_eq!(steps[1].env["MYSQL_IMAGE"], "mysql:5.7");
    }

    #[test]
    fn test_retry_replaces_default() {
        let ctx = context("6.1.0", &["2.7", "3.0"]);
        let probe = MemoryProbe::new();
        let rules = per_runtime(vec![
            StepRule::rake("actioncable")
                .task("test:integration")
                .retry_on(-1, 3),
        ]);

        let plan = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap();
        let step = &plan.groups[0].steps[0];
        assert_eq!(step.retry, Some(RetryPolicy::on_exit(-1, 3)));
        assert!(!step.soft_fail);
    }

    #[test]
    fn test_parallelism_only_with_marker() {
        let ctx = context("6.1.0", &["2.7", "3.0"]);
        let rules = per_runtime(vec![StepRule::rake("railties").parallel(
            12,
            "railties/Rakefile",
            "BUILDKITE_PARALLEL",
        )]);

        let without = MemoryProbe::new().with_file("railties/Rakefile", "task :test");
        let plan = PlanBuilder::new(&ctx, &without).build(&rules).unwrap();
        assert!(plan.steps().all(|s| s.parallelism.is_none()));

        let with = MemoryProbe::new().with_file("railties/Rakefile", "ENV['BUILDKITE_PARALLEL']");
        let plan = PlanBuilder::new(&ctx, &with).build(&rules).unwrap();
        assert!(plan
            .steps()
            .all(|s| s.parallelism == NonZeroU32::new(12)));
    }

    #[test]
    fn test_runtime_order_is_caller_controlled() {
        let ctx = context("6.1.0", &["3.0", "2.6", "2.7"]);
        let probe = MemoryProbe::new();
        let plan = PlanBuilder::new(&ctx, &probe)
            .build(&per_runtime(vec![StepRule::rake("guides")]))
            .unwrap();
        let group_labels: Vec<_> = plan.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(group_labels, vec!["ruby:3.0", "ruby:2.6", "ruby:2.7"]);
    }

    #[test]
    fn test_image_build_group() {
        let ctx = context("5.1.4", &["2.4", "2.5"]);
        let probe = MemoryProbe::new();
        let rules = RuleSet {
            groups: vec![GroupSpec::ImageBuilds {
                label: "build".to_string(),
            }],
        };

        let plan = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap();
        let build = plan.group("build").unwrap();
        assert_eq!(build.steps.len(), 2);

        let step = &build.steps[0];
        assert_eq!(step.label, ":docker: ruby:2.4");
        assert_eq!(step.key.as_deref(), Some("docker-image-ruby-2.4"));
        assert_eq!(step.queue, "builder");
        assert_eq!(step.env["RUBY_IMAGE"], "ruby:2.4");
        assert_eq!(step.env["BUNDLER"], "< 2.2.10");
        assert_eq!(step.env["RUBYGEMS"], "3.2.9");
        assert!(step.command.is_none());
    }

    #[test]
    fn test_primary_group_needs_two_runtimes() {
        let ctx = context("6.1.0", &["3.0"]);
        let probe = MemoryProbe::new();
        let rules = RuleSet {
            groups: vec![GroupSpec::Primary {
                label: "isolated".to_string(),
                rules: vec![StepRule::rake("activesupport").task("test:isolated")],
            }],
        };

        let err = PlanBuilder::new(&ctx, &probe).build(&rules).unwrap_err();
        assert!(matches!(err, Error::InsufficientRuntimes { count: 1 }));
    }
}
