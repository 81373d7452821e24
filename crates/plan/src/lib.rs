//! Step rules and plan building for kiteplan
//!
//! A [`RuleSet`] declares groups of [`StepRule`]s. [`PlanBuilder`] expands
//! them against a [`BuildContext`](kiteplan_context::BuildContext) into a
//! [`Plan`]: ordered groups of fully resolved [`StepAttrs`].
//!
//! ```ignore
//! let context = BuildContext::load(EnvSnapshot::capture()?, &rubies)?;
//! let probe = FsProbe::new(context.project_root());
//! let plan = PlanBuilder::new(&context, &probe).build(&rails_rules())?;
//! ```

pub mod attrs;
pub mod builder;
pub mod rails;
pub mod rule;

pub use attrs::{AutomaticRetry, Invocation, RetryPolicy, StepAttrs};
pub use builder::{Group, GroupSpec, Plan, PlanBuilder, RuleSet};
pub use rails::rails_rules;
pub use rule::{Condition, EnvValue, FailurePolicy, Parallelism, StepRule, Variant};
