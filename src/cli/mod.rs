pub mod args;
pub mod commands;

pub use args::{DiscoverArgs, OutputFormat, PlanArgs, RunArgs};
use crate::core::config::ConfigLoader;
use crate::logging::{self, LoggingConfig};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
FLEET COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "gitfleet")]
#[command(version = crate::VERSION)]
#[command(about = "Apply ordered maintenance operations across many git repositories")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: inspect a plan, rehearse it with --dry-run, then run it for real."
)]
pub struct Args {
    /// Directory holding gitfleet.toml (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config_dir: Option<PathBuf>,

    /// Override the configured log level (e.g. debug, gitfleet=trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Show the ordered tasks an operations document compiles to",
        long_about = "Plan orders operations by their dependencies, translates them into tasks and prints the result without touching any repository.",
        after_help = "Examples:\n    gitfleet plan fleet.yaml\n    gitfleet plan fleet.yaml --dot | dot -Tsvg > plan.svg"
    )]
    Plan(PlanArgs),
    #[command(
        about = "Execute an operations document against discovered repositories",
        long_about = "Run discovers repositories under the configured roots and applies every task in plan order, asking for confirmation before mutating changes.",
        after_help = "Example:\n    gitfleet run fleet.yaml --root ~/src --dry-run"
    )]
    Run(RunArgs),
    #[command(
        about = "List repositories found under the roots",
        long_about = "Discover walks each root and prints every git repository it finds, in the order a run would visit them.",
        after_help = "Example:\n    gitfleet discover --root ~/src --nested"
    )]
    Discover(DiscoverArgs),
}

impl Command {
    /// Commands whose stdout carries JSON keep console logs off stdout.
    fn writes_json(&self) -> bool {
        let format = match self {
            Command::Plan(args) => args.format,
            Command::Run(args) => args.format,
            Command::Discover(args) => args.format,
        };
        format == OutputFormat::Json
    }
}

/// Load configuration, initialize logging and dispatch. Returns the process exit code.
pub async fn run(args: Args) -> crate::Result<i32> {
    let workspace = match args.config_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let config = ConfigLoader::load_from_workspace(&workspace)?;

    let logging_config = LoggingConfig::from_section(&config.logging)?
        .with_level(args.log_level.as_deref())?
        .with_reserved_stdout(args.command.writes_json());
    let _guard = logging::init(&logging_config, Some(&workspace))?;

    match args.command {
        Command::Plan(plan_args) => commands::plan(plan_args).await,
        Command::Run(run_args) => commands::run(run_args, &config).await,
        Command::Discover(discover_args) => commands::discover(discover_args, &config).await,
    }
}
