use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, ValueEnum};
use kiteplan_core::VersionSpec;

/// Runtimes tried when neither `--rubies` nor `KITEPLAN_RUBIES` is given
pub const DEFAULT_RUBIES: &str = "2.4,2.5,2.6,2.7,3.0,3.1,3.2";

#[derive(Parser, Debug)]
#[command(name = "kiteplan")]
#[command(about = "Generate the Rails CI step plan for the current checkout")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(
        long,
        env = "KITEPLAN_RUBIES",
        value_delimiter = ',',
        default_value = DEFAULT_RUBIES,
        help = "Comma-separated Ruby versions to seed the matrix"
    )]
    pub rubies: Vec<VersionSpec>,

    #[arg(long, value_enum, default_value = "text", help = "Plan output format")]
    pub format: OutputFormat,

    #[arg(
        short = 'l',
        long,
        value_enum,
        default_value = "warn",
        help = "Set logging level"
    )]
    pub log_level: LogLevel,

    #[arg(long, value_enum, default_value = "compact", help = "Log output format")]
    pub log_format: TracingFormat,

    #[arg(
        long,
        help = "Tracing filter directives, e.g. kiteplan_plan=debug (overrides RUST_LOG and --log-level)"
    )]
    pub log_filter: Option<String>,
}

/// How the plan is printed to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented summary for people
    Text,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

pub fn parse() -> Cli {
    Cli::parse()
}
