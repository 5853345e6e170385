use std::path::PathBuf;
use std::sync::Arc;

/// Reset SIGPIPE to default behavior so piping (e.g. `stackwise graph -e dot | dot`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use stackwise::config::{loader, validator, CyclePolicy, Settings};
use stackwise::dag::visualizer::{self, GraphFormat};
use stackwise::dag::UnitGraph;
use stackwise::discovery::registry::TerragruntProbe;
use stackwise::discovery::Discovery;
use stackwise::executor::{ProcessRunner, StackExecutor, Terragrunt};
use stackwise::output::formatter;

/// stackwise - dependency-aware runner for Terragrunt unit trees
#[derive(Parser)]
#[command(name = "stackwise", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Terragrunt root directory (overrides terragrunt.root_path)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum number of units run or probed at once
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered units with their status
    List {
        /// Only units in this environment
        #[arg(short, long)]
        env: Option<String>,
    },

    /// Show details for a single unit
    Show {
        /// Unit path relative to the root
        path: String,
    },

    /// List stacks
    Stacks {
        #[arg(short, long)]
        env: Option<String>,
    },

    /// Show a single stack with its members and execution order
    Stack {
        /// Stack path relative to the root
        path: String,
    },

    /// Show the batch execution order
    Order {
        #[arg(short, long)]
        env: Option<String>,

        /// Fail on dependency cycles instead of running them together
        #[arg(long)]
        strict: bool,
    },

    /// Show the dependency graph
    Graph {
        /// Projection: tree, graph or dag
        #[arg(short, long, default_value = "tree")]
        format: GraphFormat,

        /// Export the edge list as json, dot or mermaid
        #[arg(short, long)]
        export: Option<String>,

        #[arg(long)]
        env: Option<String>,

        /// Limit tree depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Run a terragrunt command across every unit below a target
    Run {
        /// Target path relative to the root
        target: String,

        /// Terragrunt command (plan, apply, destroy, ...)
        command: String,

        /// Print what would run without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a single unit
    Validate {
        path: String,
    },

    /// Plan a single unit and summarise the changes
    Plan {
        path: String,
    },

    /// Summarise deployment health
    Status {
        #[arg(short, long)]
        env: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();
    let settings = load(&cli)?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(&settings.logging.level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let app = App::new(settings);

    match cli.command {
        Commands::List { ref env } => cmd_list(&app, &cli, env.as_deref()).await,
        Commands::Show { ref path } => cmd_show(&app, &cli, path).await,
        Commands::Stacks { ref env } => cmd_stacks(&app, &cli, env.as_deref()).await,
        Commands::Stack { ref path } => cmd_stack(&app, &cli, path).await,
        Commands::Order { ref env, strict } => cmd_order(&app, &cli, env.as_deref(), strict).await,
        Commands::Graph {
            format,
            ref export,
            ref env,
            max_depth,
        } => cmd_graph(&app, &cli, format, export.as_deref(), env.as_deref(), max_depth).await,
        Commands::Run {
            ref target,
            ref command,
            dry_run,
        } => cmd_run(&app, &cli, target, command, dry_run).await,
        Commands::Validate { ref path } => cmd_validate(&app, &cli, path).await,
        Commands::Plan { ref path } => cmd_plan(&app, &cli, path).await,
        Commands::Status { ref env } => cmd_status(&app, &cli, env.as_deref()).await,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn load(cli: &Cli) -> Result<Settings> {
    let mut settings = loader::load_settings(cli.config.as_deref())?;
    if let Some(ref root) = cli.root {
        settings.terragrunt.root_path = root.clone();
    }
    if let Some(parallelism) = cli.parallelism {
        settings.terragrunt.parallelism = parallelism;
    }
    validator::validate(&settings).context("Invalid configuration")?;
    Ok(settings)
}

struct App {
    settings: Arc<Settings>,
    terragrunt: Arc<Terragrunt>,
}

impl App {
    fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let terragrunt = Arc::new(Terragrunt::new(settings.clone(), Arc::new(ProcessRunner)));
        Self {
            settings,
            terragrunt,
        }
    }

    fn discovery(&self) -> Discovery {
        self.discovery_with(self.settings.clone())
    }

    fn discovery_with(&self, settings: Arc<Settings>) -> Discovery {
        let probe = Arc::new(TerragruntProbe::new(self.terragrunt.clone()));
        Discovery::new(settings, probe)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_list(app: &App, cli: &Cli, env: Option<&str>) -> Result<()> {
    let units = app.discovery().discover(env).await?;
    if cli.json {
        return print_json(&units);
    }
    formatter::print_unit_list(&units);
    Ok(())
}

async fn cmd_show(app: &App, cli: &Cli, path: &str) -> Result<()> {
    let path = path.trim_matches('/');
    let units = app.discovery().discover(None).await?;
    let Some(unit) = units.iter().find(|u| u.path == path) else {
        bail!("Unit '{}' not found.", path);
    };
    if cli.json {
        return print_json(unit);
    }
    formatter::print_unit_detail(unit);
    Ok(())
}

async fn cmd_stacks(app: &App, cli: &Cli, env: Option<&str>) -> Result<()> {
    if !app.settings.stacks.enabled && !cli.json {
        formatter::print_warning("Stacks are disabled in configuration (stacks.enabled: false)");
    }
    let stacks = app.discovery().discover_stacks(env).await?;
    if cli.json {
        return print_json(&stacks);
    }
    formatter::print_stack_list(&stacks);
    Ok(())
}

async fn cmd_stack(app: &App, cli: &Cli, path: &str) -> Result<()> {
    let stack = app.discovery().stack(path.trim_matches('/')).await?;
    if cli.json {
        return print_json(&stack);
    }
    formatter::print_stack_detail(&stack);
    Ok(())
}

async fn cmd_order(app: &App, cli: &Cli, env: Option<&str>, strict: bool) -> Result<()> {
    let discovery = if strict {
        let mut settings = (*app.settings).clone();
        settings.terragrunt.cycle_policy = CyclePolicy::Strict;
        app.discovery_with(Arc::new(settings))
    } else {
        app.discovery()
    };

    let units = discovery.discover(env).await?;
    if units.is_empty() {
        bail!("No units found.");
    }
    let plan = discovery.plan_execution(&units)?;
    if cli.json {
        return print_json(&plan);
    }
    formatter::print_execution_plan(&plan);
    Ok(())
}

async fn cmd_graph(
    app: &App,
    cli: &Cli,
    format: GraphFormat,
    export: Option<&str>,
    env: Option<&str>,
    max_depth: Option<usize>,
) -> Result<()> {
    let discovery = app.discovery();
    let units = discovery.discover(env).await?;

    if let Some(export) = export {
        let data = visualizer::to_edge_list(&UnitGraph::build(&units));
        match export {
            "json" => print_json(&data)?,
            "dot" => println!("{}", visualizer::to_dot(&data)),
            "mermaid" => println!("{}", visualizer::to_mermaid(&data)),
            other => bail!(
                "Unknown export format '{}'. Use 'json', 'dot' or 'mermaid'.",
                other
            ),
        }
        return Ok(());
    }

    let rendered = discovery.dependency_graph(&units, format, max_depth);
    if cli.json {
        return print_json(&rendered);
    }
    for line in rendered.lines() {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_run(app: &App, cli: &Cli, target: &str, command: &str, dry_run: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupt received, cancelling execution...".yellow());
            on_signal.cancel();
        }
    });

    let executor = StackExecutor::new(app.terragrunt.clone());
    let execution = executor
        .execute_command(target.trim_matches('/'), command, dry_run, cancel)
        .await?;

    if cli.json {
        print_json(&execution)?;
    } else {
        formatter::print_execution(&execution);
    }

    if !execution.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_validate(app: &App, cli: &Cli, path: &str) -> Result<()> {
    let result = app.terragrunt.validate_unit(path.trim_matches('/')).await;
    if cli.json {
        print_json(&result)?;
    } else {
        formatter::print_validation(&result);
    }
    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_plan(app: &App, cli: &Cli, path: &str) -> Result<()> {
    let result = app.terragrunt.plan_unit(path.trim_matches('/')).await?;
    if cli.json {
        return print_json(&result);
    }
    formatter::print_plan_result(&result);
    Ok(())
}

async fn cmd_status(app: &App, cli: &Cli, env: Option<&str>) -> Result<()> {
    let registry = app.discovery().discover_registry(env).await?;
    let status = registry.summary(env);
    if cli.json {
        return print_json(&status);
    }
    formatter::print_status(&status);
    Ok(())
}
