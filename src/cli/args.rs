use clap::builder::RangedU64ValueParser;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    /// Operations document (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print the operation dependency graph in Graphviz DOT format
    #[arg(long, conflicts_with = "format")]
    pub dot: bool,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Operations document (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Repository root to search; repeatable, replaces document and config roots
    #[arg(long = "root", value_name = "PATH")]
    pub roots: Vec<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Repositories processed concurrently
    #[arg(long, value_name = "N", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub parallel: Option<usize>,

    /// Report what would change without modifying any repository
    #[arg(long)]
    pub dry_run: bool,

    /// Keep running a repository's remaining tasks after one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Template variable for file contents; repeatable, overrides document variables
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_variable)]
    pub variables: Vec<(String, String)>,

    /// Emit either terminal-friendly text or machine-readable JSON events
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct DiscoverArgs {
    /// Repository root to search; repeatable, replaces config roots
    #[arg(long = "root", value_name = "PATH")]
    pub roots: Vec<PathBuf>,

    /// Also report repositories nested inside other repositories
    #[arg(long)]
    pub nested: bool,

    /// Order deepest repositories first
    #[arg(long)]
    pub descending_depth: bool,

    /// Emit either one path per line or a JSON array
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Text,
    /// JSON suitable for downstream tooling
    Json,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
