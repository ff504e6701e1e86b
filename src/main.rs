//! # ByteBrief CLI (`bytebrief`)
//!
//! ## Usage
//!
//! ```bash
//! bytebrief --config ./config/bytebrief.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bytebrief archive` | Archive a thread read from `--file` or stdin |
//! | `bytebrief run` | Run the configured generation stages and archive the result |
//! | `bytebrief format` | Print the normalized thread without touching Google |
//! | `bytebrief auth` | Obtain (or refresh) the stored credential |
//! | `bytebrief resolve` | Print the canonical archive document id and URL |
//! | `bytebrief setup` | Guided first-run setup |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bytebrief::error::ArchiveError;
use bytebrief::{archive, config, setup};

/// ByteBrief: archive generated tweet threads into one Google Doc.
///
/// Configuration is read from `--config`, or `./config/bytebrief.toml` when
/// present. See `config/bytebrief.example.toml` for every setting.
#[derive(Parser)]
#[command(name = "bytebrief", version, about = "Archive tweet threads into Google Docs")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a thread.
    ///
    /// Reads the thread from `--file`, or stdin when omitted, formats it as
    /// labeled tweets, and appends it to the archive document.
    Archive {
        /// Input file (defaults to stdin).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Archive into this document id, overriding config and GOOGLE_DOC_ID.
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Run the generation pipeline and archive its output.
    Run {
        /// Seed text for the first stage (defaults to `pipeline.seed`).
        #[arg(long)]
        seed: Option<String>,

        /// Print the formatted thread instead of archiving it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the normalized thread. Makes no network calls.
    Format {
        /// Input file (defaults to stdin).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Obtain a valid credential, running consent if needed.
    Auth,

    /// Print the canonical archive document id and URL.
    Resolve {
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Check the client secret, authenticate, and prepare the archive document.
    Setup {
        /// Also append a test entry.
        #[arg(long)]
        test_entry: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Archive errors already embed their cause in the message.
            match e.downcast_ref::<ArchiveError>() {
                Some(err) => eprintln!("❌ {}", err),
                None => eprintln!("❌ {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Formatting needs no config.
    if let Commands::Format { file } = &cli.command {
        return archive::run_format(file.as_deref()).await;
    }

    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Archive { file, doc_id } => {
            archive::run_archive(&cfg, file.as_deref(), doc_id).await?;
        }
        Commands::Run { seed, dry_run } => {
            archive::run_pipeline(&cfg, seed, dry_run).await?;
        }
        Commands::Format { .. } => {}
        Commands::Auth => {
            setup::run_auth(&cfg).await?;
        }
        Commands::Resolve { doc_id } => {
            archive::run_resolve(&cfg, doc_id).await?;
        }
        Commands::Setup { test_entry } => {
            setup::run_setup(&cfg, test_entry).await?;
        }
    }
    Ok(())
}
