//! Librarian CLI - command-line interface for the local code-knowledge
//! engine. Thin: argument parsing, output formatting, exit-code
//! mapping. All logic lives in `librarian_core`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli_error;
mod commands;
mod output;

use cli_error::CliResult;
use output::OutputMode;

#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "A local code-knowledge engine for coding agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Workspace root. Defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Suppress non-essential output.
    #[arg(long, global = true)]
    quiet: bool,

    /// Assume yes for any confirmation prompt.
    #[arg(long, global = true)]
    yes: bool,

    /// Disable network-dependent providers for this invocation.
    #[arg(long, global = true)]
    offline: bool,

    /// Disable usage telemetry for this invocation.
    #[arg(long, global = true)]
    no_telemetry: bool,

    /// Print full error chains instead of a one-line message.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace and build a fresh index.
    Bootstrap {
        /// Glob patterns to include (repeatable). Defaults to `**/*.rs`.
        #[arg(long = "include")]
        include: Vec<String>,
        /// Glob patterns to exclude (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Skip files whose mtime/size match the last index.
        #[arg(long)]
        fast: bool,
    },
    /// Re-extract changed files into an existing index.
    Reindex {
        /// Workspace-relative paths that changed.
        paths: Vec<String>,
        /// Also re-extract files that depend on the changed ones.
        #[arg(long)]
        dependents: bool,
        /// Re-extract the entire workspace.
        #[arg(long)]
        full: bool,
        /// Skip files whose mtime/size match the last index.
        #[arg(long)]
        fast: bool,
    },
    /// Ask a question and assemble a token-budgeted context pack.
    Query {
        /// The query text.
        query: String,
        /// Maximum tokens the assembled pack may spend.
        #[arg(long, default_value = "4000")]
        budget: usize,
        /// Require a fresh, non-stale ledger claim on the best candidate.
        #[arg(long)]
        release_critical: bool,
    },
    /// Show index version, file/symbol counts, and provider state.
    Status,
    /// Check store health and optionally reclaim quarantined files.
    Doctor {
        /// Delete quarantined store files left behind by recovery.
        #[arg(long)]
        purge_quarantine: bool,
    },
    /// Measure query latency against the current index.
    Benchmark {
        /// Query text to repeat.
        query: String,
        /// Number of iterations.
        #[arg(long, default_value = "20")]
        iterations: usize,
    },
    /// Delete a workspace's index entirely.
    Uninstall,
    /// Inspect or switch the embedding/LLM provider.
    Provider {
        #[command(subcommand)]
        command: ProviderCommands,
    },
    /// Bundle the workspace index into a single portable archive.
    Export {
        /// Path to write the archive to.
        output: PathBuf,
    },
    /// Unpack an archive produced by `export` into a target workspace.
    Import {
        /// Path to the archive.
        archive: PathBuf,
        /// Workspace to import into. Must not already have an index.
        #[arg(long)]
        target: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProviderCommands {
    /// Switch the active provider.
    Use {
        /// Provider name.
        name: String,
    },
    /// List known providers.
    List,
    /// Show the currently selected provider.
    Current,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.offline {
        std::env::set_var("LIBRARIAN_OFFLINE", "1");
    }
    if cli.no_telemetry {
        std::env::set_var("LIBRARIAN_NO_TELEMETRY", "1");
    }

    let non_interactive = std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok();
    let no_color = cli.no_color || std::env::var("NO_COLOR").is_ok();
    let out = OutputMode {
        json: cli.json,
        no_color: no_color && std::env::var("FORCE_COLOR").is_err(),
        quiet: cli.quiet || (non_interactive && cli.quiet),
    };

    if let Err(e) = dispatch(&cli, &out) {
        report_error(&e, cli.debug, &out);
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: &Cli, out: &OutputMode) -> CliResult<()> {
    match &cli.command {
        Commands::Bootstrap { include, exclude, fast } => {
            let include = if include.is_empty() {
                commands::DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
            } else {
                include.clone()
            };
            let exclude = if exclude.is_empty() {
                commands::DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
            } else {
                exclude.clone()
            };
            commands::bootstrap::run(&cli.workspace, include, exclude, *fast, out)
        }
        Commands::Reindex { paths, dependents, full, fast } => {
            commands::reindex::run(&cli.workspace, paths.clone(), *dependents, *full, *fast, out)
        }
        Commands::Query { query, budget, release_critical } => {
            commands::query::run(&cli.workspace, query.clone(), *budget, *release_critical, out)
        }
        Commands::Status => commands::status::run(&cli.workspace, out),
        Commands::Doctor { purge_quarantine } => {
            commands::doctor::run(&cli.workspace, *purge_quarantine, out)
        }
        Commands::Benchmark { query, iterations } => {
            commands::benchmark::run(&cli.workspace, query.clone(), *iterations, out)
        }
        Commands::Uninstall => commands::uninstall::run(&cli.workspace, cli.yes, out),
        Commands::Provider { command } => match command {
            ProviderCommands::Use { name } => {
                commands::provider::use_provider(&cli.workspace, name.clone(), out)
            }
            ProviderCommands::List => {
                commands::provider::list(out);
                Ok(())
            }
            ProviderCommands::Current => commands::provider::current(&cli.workspace, out),
        },
        Commands::Export { output } => commands::export::run(&cli.workspace, output.clone(), out),
        Commands::Import { archive, target } => {
            commands::import::run(archive, target.clone(), out)
        }
    }
}

fn report_error(e: &cli_error::CliError, debug: bool, out: &OutputMode) {
    if out.json {
        let payload = serde_json::json!({
            "error": e.to_string(),
            "kind": e.exit_code_name(),
        });
        eprintln!("{}", payload);
        return;
    }

    if debug {
        eprintln!("error: {:#?}", e);
    } else {
        eprintln!("error: {}", e);
    }
    if let Some(suggestion) = e.recovery_suggestion() {
        eprintln!("  {}", suggestion);
    }
}
