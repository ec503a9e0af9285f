mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::run::CommandFailed;
use idehealth_cli::root;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "idehealth",
    about = "Cached IDE detection with circuit breaking, and guarded commands with categorized recovery",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .idehealth/ or .git/)
    #[arg(long, global = true, env = "IDEHEALTH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a target through the detection cache and circuit breaker.
    /// The probe exits 0 when detected, 1 when not, anything else is a failure
    Check {
        /// Target name, e.g. cursor or vscode
        target: String,
        /// Cache scope (default: project root)
        #[arg(long)]
        scope: Option<String>,
        /// Kill the probe after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Probe command, run with `sh -c`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a command, recovering from failures by error category
    Run {
        /// Target name used in error messages
        target: String,
        /// Print this value instead of failing once recovery is exhausted
        #[arg(long)]
        or_default: Option<String>,
        /// Kill the command after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Command to run with `sh -c`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Show cache and circuit metrics
    Metrics,

    /// Show the circuit breaker state for a target
    Circuit { target: String },

    /// Drop cached detection results (`*` for every target)
    Invalidate {
        target: String,
        /// Only drop this scope
        #[arg(long)]
        scope: Option<String>,
    },

    /// Clear cache, circuits, and metrics
    Reset,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Check {
            target,
            scope,
            timeout_ms,
            command,
        } => cmd::check::run(&root, &target, scope.as_deref(), &command, timeout_ms, cli.json),
        Commands::Run {
            target,
            or_default,
            timeout_ms,
            command,
        } => cmd::run::run(&root, &target, &command, timeout_ms, or_default),
        Commands::Metrics => cmd::metrics::run(&root, cli.json),
        Commands::Circuit { target } => cmd::circuit::run(&root, &target, cli.json),
        Commands::Invalidate { target, scope } => {
            cmd::invalidate::run(&root, &target, scope.as_deref())
        }
        Commands::Reset => cmd::reset::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e.downcast_ref::<CommandFailed>().map_or(1, |f| f.code);
        std::process::exit(code);
    }
}
