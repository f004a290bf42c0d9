use crate::{
    cli::args::{DiscoverArgs, OutputFormat, PlanArgs, RunArgs},
    core::{
        actions::register_builtins,
        config::AppConfig,
        confirm::{ConfirmationCascade, ConsolePrompter, NonInteractivePrompter, Prompter},
        git::{GitRunner, TokioGitRunner},
        operations::{
            dot::operations_to_dot, order_operations, translate_operations, OperationsDocument,
            RuntimeOptions, TranslatedPlan,
        },
        runtime::{
            discovery::order_repositories, execute_operations, ActionRegistry, EventSink,
            ExecutionOutcome, FanoutEventSink, FilesystemDiscoverer, GitWorktreeInspector,
            JsonLinesEventSink, RepositoryDiscoverer, RuntimeDeps, TracingEventSink,
        },
    },
    Result,
};
use anyhow::anyhow;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Print the compiled plan or its dependency graph.
pub async fn plan(args: PlanArgs) -> Result<i32> {
    let document = OperationsDocument::load_from_file(&args.file)?;
    let nodes = document.nodes()?;

    if args.dot {
        print!("{}", operations_to_dot(&nodes));
        return Ok(0);
    }

    let ordered = order_operations(&nodes)?;
    let plan = translate_operations(&ordered)?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print!("{}", render_plan(&plan)),
    }
    Ok(0)
}

fn render_plan(plan: &TranslatedPlan) -> String {
    let mut out = String::new();
    for (index, task) in plan.tasks.iter().enumerate() {
        out.push_str(&format!("{:>3}. {}\n", index + 1, task.name));
        if !task.files.is_empty() {
            out.push_str(&format!("       files: {}\n", task.files.len()));
        }
        for action in &task.actions {
            out.push_str(&format!("       - {}\n", action.action_type));
        }
    }
    let flags = [
        ("include nested repositories", plan.runtime.include_nested_repositories),
        (
            "descending depth order",
            plan.runtime.process_repositories_by_descending_depth,
        ),
        (
            "capture initial worktree status",
            plan.runtime.capture_initial_worktree_status,
        ),
    ];
    for (label, enabled) in flags.iter().filter(|(_, enabled)| *enabled) {
        out.push_str(&format!("runtime: {} = {}\n", label, enabled));
    }
    out
}

/// Execute an operations document. Exit code 1 when any repository failed.
pub async fn run(args: RunArgs, config: &AppConfig) -> Result<i32> {
    let document = OperationsDocument::load_from_file(&args.file)?;
    let nodes = document.nodes()?;
    let roots = resolve_roots(&args.roots, &document.roots, &config.defaults.roots)?;
    let options = build_runtime_options(&args, &document, config);

    let runner: Arc<dyn GitRunner> = Arc::new(TokioGitRunner);
    let mut builder = ActionRegistry::builder();
    register_builtins(&mut builder, runner.clone());

    let prompter: Arc<dyn Prompter> = if std::io::stdin().is_terminal() {
        Arc::new(ConsolePrompter::new())
    } else {
        Arc::new(NonInteractivePrompter)
    };

    let sink: Arc<dyn EventSink> = match args.format {
        OutputFormat::Text => Arc::new(TracingEventSink),
        OutputFormat::Json => Arc::new(FanoutEventSink::new(vec![
            Arc::new(JsonLinesEventSink::stdout()),
            Arc::new(TracingEventSink),
        ])),
    };

    let deps = RuntimeDeps {
        discoverer: Arc::new(FilesystemDiscoverer),
        inspector: Arc::new(GitWorktreeInspector::new(runner)),
        registry: builder.build(),
        cascade: Arc::new(ConfirmationCascade::new(Some(prompter), options.assume_yes)),
        sink,
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight repositories");
            signal_token.cancel();
        }
    });

    let outcome = execute_operations(&nodes, &roots, &options, &deps, cancel).await?;
    report_outcome(&outcome, args.format)?;

    Ok(if outcome.has_failures() || outcome.cancelled {
        1
    } else {
        0
    })
}

fn report_outcome(outcome: &ExecutionOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(outcome)?),
        OutputFormat::Text => {
            for repository in outcome.repositories.iter().filter(|r| r.error.is_some()) {
                println!(
                    "failed: {} ({})",
                    repository.path.display(),
                    repository.error.as_deref().unwrap_or_default()
                );
            }
            println!("{}", outcome.summary_line());
        }
    }
    Ok(())
}

/// List repositories under the roots in visiting order.
pub async fn discover(args: DiscoverArgs, config: &AppConfig) -> Result<i32> {
    let roots = resolve_roots(&args.roots, &[], &config.defaults.roots)?;
    let found = FilesystemDiscoverer.discover(&roots, args.nested).await?;
    let ordered = order_repositories(found, args.descending_depth);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ordered)?),
        OutputFormat::Text => {
            for path in &ordered {
                println!("{}", path.display());
            }
        }
    }
    Ok(0)
}

/// First non-empty list wins: CLI, then document, then config.
fn resolve_roots(
    cli: &[PathBuf],
    document: &[PathBuf],
    configured: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    [cli, document, configured]
        .into_iter()
        .find(|roots| !roots.is_empty())
        .map(<[PathBuf]>::to_vec)
        .ok_or_else(|| {
            anyhow!("no repository roots given; pass --root or set defaults.roots in gitfleet.toml")
        })
}

/// Layer config defaults, document settings and CLI flags, in increasing precedence.
fn build_runtime_options(
    args: &RunArgs,
    document: &OperationsDocument,
    config: &AppConfig,
) -> RuntimeOptions {
    let settings = &document.settings;
    let defaults = &config.defaults;

    let mut variables = document.variables.clone();
    for (key, value) in &args.variables {
        variables.insert(key.clone(), value.clone());
    }

    RuntimeOptions {
        assume_yes: args.yes || settings.assume_yes.unwrap_or(defaults.assume_yes),
        dry_run: args.dry_run,
        fail_fast: !args.continue_on_error && settings.fail_fast.unwrap_or(defaults.fail_fast),
        workflow_parallelism: args
            .parallel
            .or(settings.parallelism)
            .unwrap_or(defaults.parallelism),
        variables,
        ..RuntimeOptions::default()
    }
}
