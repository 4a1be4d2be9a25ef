//! Cellflow CLI entry point

use anyhow::{Context, Result};
use cellflow::core::{build_graph, CompiledCell, DependencyGraph, VariableIndex};
use cellflow::{App, Config, Notebook, RuntimeMode, RunStatus};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cellflow", version, about = "Run notebook cells on remote workers")]
struct Cli {
    /// Config file (defaults to ./cellflow.yml when present)
    #[arg(long, global = true, env = "CELLFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Dispatch to the local server instead of a worker
    #[arg(long, global = true)]
    local: bool,

    /// Local server URL
    #[arg(long, global = true, env = "CELLFLOW_SERVER_URL")]
    server_url: Option<String>,

    /// Server token sent with every request
    #[arg(long, global = true, env = "CELLFLOW_SERVER_TOKEN")]
    server_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect workers and show their status
    Workers {
        /// Worker URLs to add
        urls: Vec<String>,
    },
    /// Run notebook cells and print the resulting dataflow
    Run {
        notebook: PathBuf,
        /// Cells to run (all cells when omitted)
        #[arg(long = "cell")]
        cells: Vec<String>,
        /// Worker URL to run on
        #[arg(long)]
        worker: Option<String>,
    },
    /// Print the dataflow of a JSON array of compiled cells
    Graph { compiled: PathBuf },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::auto_load()?,
        };
        if self.local {
            config.mode = RuntimeMode::Local;
        }
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(token) = &self.server_token {
            config.server_token = token.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::debug!("cellflow v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Graph { compiled } => graph_command(compiled),
        Command::Workers { urls } => {
            let mut app = App::new(cli.load_config()?);
            connect(&mut app, urls, None).await;
            print_workers(&app);
            Ok(())
        }
        Command::Run {
            notebook,
            cells,
            worker,
        } => run_command(cli.load_config()?, notebook, cells, worker.as_deref()).await,
    }
}

/// Restore remembered workers, add new ones, and connect until settled
async fn connect(app: &mut App, urls: &[String], extra: Option<&str>) {
    app.restore_recent_workers();
    for url in urls.iter().map(String::as_str).chain(extra) {
        app.add_worker(url);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling worker connections");
            on_interrupt.cancel();
        }
    });

    app.connect_workers(&cancel).await;
    interrupt.abort();
}

fn print_workers(app: &App) {
    let workers = app.registry.workers();
    if workers.is_empty() {
        println!("No workers");
    }
    for worker in workers {
        println!("{:<12} {:<24} {}", worker.status().to_string(), worker.label(), worker.url());
    }
    match app.registry.default_worker() {
        Some(url) => println!("Default worker: {}", url),
        None => println!("Default worker: none"),
    }
}

async fn run_command(
    config: Config,
    notebook_path: &Path,
    cells: &[String],
    worker: Option<&str>,
) -> Result<()> {
    let notebook = Notebook::from_file(notebook_path)
        .with_context(|| format!("failed to load notebook {}", notebook_path.display()))?;
    let cell_ids = if cells.is_empty() {
        notebook.cell_ids()
    } else {
        cells.to_vec()
    };

    let mut app = App::new(config);
    notebook.apply_assignments(&mut app.dispatcher.assignments);
    if app.config.mode == RuntimeMode::Workers {
        connect(&mut app, &[], worker).await;
    }

    if cell_ids.is_empty() {
        println!("No cells to run");
        return Ok(());
    }
    if app.run_cells(&cell_ids, &notebook, worker).await.is_none() {
        anyhow::bail!("Run could not be dispatched (see log)");
    }

    app.wait_for_runs().await;
    if let Some(run) = app.dispatcher.session.last_run() {
        if run.status != RunStatus::Completed {
            anyhow::bail!("Run ended without a result ({:?})", run.status);
        }
    }

    let dataflow = app.compiled.dataflow();
    print_dataflow(&dataflow.graph, &dataflow.variables);
    Ok(())
}

fn graph_command(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cells: Vec<CompiledCell> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of compiled cells", path.display()))?;

    let (graph, variables) = build_graph(&cells);
    print_dataflow(&graph, &variables);
    Ok(())
}

fn print_dataflow(graph: &DependencyGraph, variables: &VariableIndex) {
    println!("Edges:");
    for (from, to) in &graph.edges {
        if from == to {
            println!("  {} -> {} (self)", from, to);
        } else {
            println!("  {} -> {}", from, to);
        }
    }

    println!("Variables:");
    for variable in variables.values() {
        let declared: Vec<&str> = variable.declared_by.iter().map(String::as_str).collect();
        let used: Vec<&str> = variable.used_by.iter().map(String::as_str).collect();
        println!(
            "  {}: declared by [{}], used by [{}]",
            variable.name,
            declared.join(", "),
            used.join(", ")
        );
    }
}
