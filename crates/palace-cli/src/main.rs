//! palace CLI: turn extracted study text into stored quizzes.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(
    name = "palace",
    version,
    about = "Study-material analysis over a cascade of generative backends"
)]
struct Cli {
    /// Config file path (defaults to ./palace.toml, then ~/.config/palace/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one extracted text file and store the result
    Analyze {
        /// Path to a UTF-8 text file
        #[arg(long)]
        input: PathBuf,

        /// Title for the stored record (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Print the stored record as JSON instead of a summary table
        #[arg(long)]
        json: bool,
    },

    /// Analyze every .txt file in a directory concurrently
    Ingest {
        /// Directory of extracted text files
        #[arg(long)]
        dir: PathBuf,
    },

    /// Generate a fresh quiz for a stored record
    RegenerateQuiz {
        /// Record id
        #[arg(long)]
        id: Uuid,
    },

    /// Print a stored record as JSON
    Show {
        /// Record id
        #[arg(long)]
        id: Uuid,
    },

    /// List stored records, newest first
    List,

    /// Show the configured backend cascade order
    Backends,

    /// Create a starter palace.toml
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("palace=info")),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling in-flight requests...");
            on_interrupt.cancel();
        }
    });

    let config = cli.config;
    let result = match cli.command {
        Commands::Analyze { input, title, json } => {
            commands::analyze::execute(input, title, json, config, cancel).await
        }
        Commands::Ingest { dir } => commands::ingest::execute(dir, config, cancel).await,
        Commands::RegenerateQuiz { id } => {
            commands::regenerate_quiz::execute(id, config, cancel).await
        }
        Commands::Show { id } => commands::show::execute(id, config).await,
        Commands::List => commands::list::execute(config).await,
        Commands::Backends => commands::backends::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
