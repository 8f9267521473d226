use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use biodatagraph::config::{ConfigLoader, RunConfig, RunMode};
use biodatagraph::error::BiographError;
use biodatagraph::graph::{GraphStore, MemoryGraph, Neo4jHttpStore};
use biodatagraph::http::HttpFetcher;
use biodatagraph::output::{CheckResult, ConsoleOutput, JsonOutput, ListResult, OutputMode};
use biodatagraph::pipeline::{Pipeline, ProgressSink, RunOptions};
use biodatagraph::store::Store;

#[derive(Parser)]
#[command(name = "biodatagraph")]
#[command(about = "Refresh biomedical reference datasets and load them into a graph database")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Pipeline definition; defaults to ./biodatagraph.json or the built-in catalog.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Dataset cache directory; overrides BIODATAGRAPH_ROOT.
    #[arg(long, global = true)]
    root: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Refresh datasources, run parsers and load the graph (default)")]
    Run(RunArgs),
    #[command(about = "Report which datasources have a newer remote release")]
    Check,
    #[command(about = "List locally available releases")]
    List,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Use the local copies as they are.
    #[arg(long)]
    skip_download: bool,

    /// Load into an in-memory graph instead of the configured server.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BiographError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BiographError) -> u8 {
    match error {
        error if error.is_config() => 2,
        BiographError::DownloadFailed { .. }
        | BiographError::Http(_)
        | BiographError::HttpStatus { .. }
        | BiographError::VersionResolution(_) => 3,
        BiographError::ParseFailed { .. } => 4,
        BiographError::LoadFailed { .. } => 5,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,biodatagraph=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if RunMode::from_env() == RunMode::Test {
        info!("Run tests");
        return Ok(());
    }
    let mut settings = RunConfig::from_env()?;

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    if let Some(root) = cli.root {
        settings.root = root;
    }
    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(size) = resolved.batch_size {
        settings.graph.batch_size = size;
    }
    let store = Store::new(settings.root.clone());
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &ConsoleOutput,
    };

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let fetcher = HttpFetcher::new()?;
            let mut pipeline = Pipeline::from_resolved(&resolved, &store, fetcher)?;
            let options = RunOptions {
                skip_refresh: args.skip_download,
            };
            info!(root = %settings.root, "starting run");

            let memory;
            let server;
            let graph: &dyn GraphStore = if args.dry_run {
                memory = MemoryGraph::new();
                &memory
            } else {
                server = Neo4jHttpStore::new(&settings.graph)?;
                &server
            };

            let report = pipeline.run(graph, options, sink)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_run(&report).into_diagnostic()?,
                OutputMode::Interactive => ConsoleOutput::print_run(&report),
            }
            Ok(())
        }
        Commands::Check => {
            let fetcher = HttpFetcher::new()?;
            let pipeline = Pipeline::from_resolved(&resolved, &store, fetcher)?;
            let result = CheckResult {
                datasources: pipeline.check(sink)?,
            };
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_check(&result).into_diagnostic()?,
                OutputMode::Interactive => ConsoleOutput::print_check(&result),
            }
            Ok(())
        }
        Commands::List => {
            let result = ListResult {
                releases: store.all_releases()?,
            };
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Interactive => ConsoleOutput::print_list(&result),
            }
            Ok(())
        }
    }
}
