//! The Rails rule set
//!
//! Image builds first, then one group per runtime with the framework suites,
//! then the isolated suites on the primary runtime only.

use crate::builder::{GroupSpec, RuleSet};
use crate::rule::{Condition, FailurePolicy, StepRule, Variant};
use kiteplan_core::VersionSpec;

/// Label of the image build group
pub const BUILD_GROUP: &str = "build";
/// Label of the isolated suites group
pub const ISOLATED_GROUP: &str = "isolated";
/// Marker a Rakefile mentions when it can shard its suite
pub const PARALLEL_MARKER: &str = "BUILDKITE_PARALLEL";
/// Exit status the agent reports when a job is lost
const LOST_AGENT: i32 = -1;

/// Lower edge of the 5 series; sorts below `5.0` and above `5.0.0.beta1`
fn rails_5() -> VersionSpec {
    VersionSpec::prerelease(&[5], "x")
}

fn rails_5_1() -> VersionSpec {
    VersionSpec::prerelease(&[5, 1], "x")
}

fn rails_6() -> VersionSpec {
    VersionSpec::prerelease(&[6], "x")
}

fn rails_6_1() -> VersionSpec {
    VersionSpec::prerelease(&[6, 1], "x")
}

/// First version shipping the trilogy adapter
fn rails_7_1() -> VersionSpec {
    VersionSpec::prerelease(&[7, 1, 0], "alpha")
}

fn on_primary(condition: Condition) -> Condition {
    Condition::All(vec![Condition::PrimaryRuntime, condition])
}

/// Re-runs against Rack 2 and Rack head on the primary runtime
fn rack_variants(rule: StepRule) -> StepRule {
    rule.variant(
        Variant::new("rack-2")
            .when(Condition::PrimaryRuntime)
            .pre_steps(["bundle install"])
            .env("RACK", "~> 2.0"),
    )
    .variant(
        Variant::new("rack-head")
            .when(Condition::PrimaryRuntime)
            .pre_steps(["rm Gemfile.lock", "bundle install"])
            .env("RACK", "head")
            .soft_fail(),
    )
}

fn mysql2_suite() -> StepRule {
    StepRule::rake("activerecord")
        .task("mysql2:test")
        .service("mysqldb")
        .variant(
            Variant::new("mariadb")
                .when(on_primary(Condition::VersionAtLeast(rails_5())))
                .env_by_version("MYSQL_IMAGE", rails_6(), "mariadb:10.2", "mariadb:latest"),
        )
        .variant(
            Variant::new("mysql_5_7")
                .when(Condition::PrimaryRuntime)
                .env("MYSQL_IMAGE", "mysql:5.7"),
        )
        .variant(
            Variant::new("prepared_statements")
                .when(on_primary(Condition::VersionAtLeast(rails_6_1())))
                .env("MYSQL_PREPARED_STATEMENTS", "true"),
        )
}

fn trilogy_suite() -> StepRule {
    StepRule::rake("activerecord")
        .task("trilogy:test")
        .service("mysqldb")
        .when(Condition::VersionAtLeast(rails_7_1()))
        .variant(
            Variant::new("mariadb")
                .when(Condition::PrimaryRuntime)
                .env("MYSQL_IMAGE", "mariadb:latest"),
        )
        .variant(
            Variant::new("mysql_5_7")
                .when(Condition::PrimaryRuntime)
                .env("MYSQL_IMAGE", "mysql:5.7"),
        )
}

fn runtime_suites() -> Vec<StepRule> {
    vec![
        StepRule::rake("actioncable").service("postgresdb"),
        StepRule::rake("actionmailbox"),
        StepRule::rake("actionmailer"),
        rack_variants(StepRule::rake("actionpack")),
        StepRule::rake("actiontext"),
        StepRule::rake("actionview"),
        StepRule::rake("activejob"),
        StepRule::rake("activemodel"),
        mysql2_suite(),
        StepRule::rake("activerecord")
            .task("postgresql:test")
            .service("postgresdb"),
        StepRule::rake("activerecord").task("sqlite3:test"),
        StepRule::rake("activerecord")
            .task("sqlite3_mem:test")
            .when(on_primary(Condition::VersionAtLeast(rails_5_1()))),
        trilogy_suite(),
        StepRule::rake("activestorage"),
        StepRule::rake("activesupport"),
        StepRule::rake("guides"),
        rack_variants(
            StepRule::rake("railties")
                .service("railties")
                .parallel(12, "railties/Rakefile", PARALLEL_MARKER),
        ),
        StepRule::rake("actioncable")
            .task("test:integration")
            .failure(FailurePolicy::When {
                condition: Condition::VersionBelow(rails_6()),
                then: Box::new(FailurePolicy::SoftFail),
                otherwise: Box::new(FailurePolicy::RetryOn {
                    exit_status: LOST_AGENT,
                    limit: 3,
                }),
            }),
        StepRule::rake("actionview")
            .task("test:ujs")
            .service("actionview")
            .when(on_primary(Condition::file_contains(
                "actionview/Rakefile",
                "task :ujs",
            )))
            .retry_on(LOST_AGENT, 3),
        StepRule::rake("activejob")
            .task("test:integration")
            .service("activejob")
            .failure(FailurePolicy::soft_fail_when(Condition::VersionBelow(
                rails_5(),
            ))),
    ]
}

fn isolated_suites() -> Vec<StepRule> {
    let adapters = [
        ("mysql2:isolated_test", Some("mysqldb")),
        ("postgresql:isolated_test", Some("postgresdb")),
        ("sqlite3:isolated_test", None),
        ("trilogy:isolated_test", Some("mysqldb")),
    ];
    let frameworks = [
        "actionmailer",
        "actionpack",
        "actionview",
        "activejob",
        "activemodel",
        "activesupport",
    ];

    adapters
        .into_iter()
        .map(|(task, service)| {
            let rule = StepRule::rake("activerecord").task(task).parallel(
                5,
                "activerecord/Rakefile",
                PARALLEL_MARKER,
            );
            match service {
                Some(service) => rule.service(service),
                None => rule,
            }
        })
        .chain(
            frameworks
                .into_iter()
                .map(|subproject| StepRule::rake(subproject).task("test:isolated")),
        )
        .collect()
}

/// The full Rails CI rule set
#[must_use]
pub fn rails_rules() -> RuleSet {
    RuleSet {
        groups: vec![
            GroupSpec::ImageBuilds {
                label: BUILD_GROUP.to_string(),
            },
            GroupSpec::PerRuntime {
                rules: runtime_suites(),
            },
            GroupSpec::Primary {
                label: ISOLATED_GROUP.to_string(),
                rules: isolated_suites(),
            },
        ],
    }
}
