//! kiteplan: generate the Rails CI step plan for a checkout

// stdout carries the plan, stderr the final error report
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod output;
mod tracing;

use crate::cli::Cli;
use crate::tracing::TracingConfig;
use kiteplan_context::{BuildContext, EnvSnapshot, FsProbe};
use kiteplan_core::VersionSpec;
use kiteplan_plan::{Plan, PlanBuilder, rails_rules};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

fn run() -> miette::Result<()> {
    let cli = cli::parse();

    crate::tracing::init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        filter: cli.log_filter.clone(),
    })?;

    let plan = generate(&cli)?;
    println!("{}", output::render(&plan, cli.format)?.trim_end());
    Ok(())
}

fn generate(cli: &Cli) -> miette::Result<Plan> {
    let span = ::tracing::info_span!(
        "generate",
        correlation_id = %crate::tracing::correlation_id(),
        rubies = cli.rubies.len(),
    );
    let _guard = span.enter();

    let context = BuildContext::load(EnvSnapshot::capture()?, &cli.rubies)?;
    log_context(&context, &cli.rubies);

    let probe = FsProbe::new(context.project_root());
    Ok(PlanBuilder::new(&context, &probe).build(&rails_rules())?)
}

fn log_context(context: &BuildContext, seed: &[VersionSpec]) {
    ::tracing::debug!(
        seeded = seed.len(),
        runtimes = context.runtimes().len(),
        build_id = context.build_id(),
        build_queue = context.build_queue(),
        run_queue = context.run_queue(),
        image_base = %context.image_base(),
        "Generating plan"
    );
}
