//! # CFA question generator CLI (`qgen`)
//!
//! ## Usage
//!
//! ```bash
//! qgen --config ./config/qgen.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qgen init` | Create the SQLite database and schema |
//! | `qgen topics` | List topic areas with source-file and question counts |
//! | `qgen chunk <topic>` | Show how a topic's documents are chunked (dry-run) |
//! | `qgen index <topic\|all>` | Embed topic chunks into the vector index |
//! | `qgen generate --topic <t> --difficulty <d>` | Generate a batch of questions |
//! | `qgen serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! qgen init
//! qgen generate --topic "Fixed Income" --difficulty intermediate --count 3
//! qgen generate --topic derivatives --difficulty advanced --subtopic "Swaps" --save
//! RUST_LOG=debug qgen serve
//! ```

use cfa_questgen::{commands, config, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Generates CFA multiple-choice exam questions grounded in topic study
/// material.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. The OpenAI API key is read from `OPENAI_API_KEY`.
#[derive(Parser)]
#[command(
    name = "qgen",
    about = "Generate CFA exam questions grounded in study material",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/qgen.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List the 10 topic areas with source-file and stored question counts.
    Topics,

    /// Show documents and chunk counts for a topic without generating.
    Chunk {
        /// Topic area, e.g. "Fixed Income" or `fixed-income`.
        topic: String,

        /// Restrict to files matching this subtopic hint.
        #[arg(long)]
        subtopic: Option<String>,
    },

    /// Embed topic chunks into the SQLite vector index.
    ///
    /// Requires an enabled `[embedding]` provider.
    Index {
        /// Topic area, or `all`.
        target: String,
    },

    /// Generate a batch of questions and print the result as JSON.
    Generate {
        /// Topic area, e.g. "Fixed Income" or `fixed-income`.
        #[arg(long)]
        topic: String,

        /// `beginner`, `intermediate`, or `advanced`.
        #[arg(long)]
        difficulty: String,

        /// Number of generation attempts.
        #[arg(long, default_value_t = 1)]
        count: usize,

        #[arg(long)]
        subtopic: Option<String>,

        /// Learning objective identifier, e.g. "LO 45.a".
        #[arg(long)]
        lo_id: Option<String>,

        /// Learning objective statement.
        #[arg(long)]
        lo_text: Option<String>,

        /// Save accepted questions to the database.
        #[arg(long)]
        save: bool,

        /// Skip the pause between attempts.
        #[arg(long)]
        no_delay: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Topics => commands::run_topics(&cfg).await?,
        Commands::Chunk { topic, subtopic } => {
            commands::run_chunk(&cfg, &topic, subtopic.as_deref()).await?
        }
        Commands::Index { target } => commands::run_index(&cfg, &target).await?,
        Commands::Generate {
            topic,
            difficulty,
            count,
            subtopic,
            lo_id,
            lo_text,
            save,
            no_delay,
        } => {
            let args = commands::GenerateArgs {
                topic,
                difficulty,
                count,
                subtopic,
                lo_id,
                lo_text,
                save,
                no_delay,
            };
            commands::run_generate(&cfg, args).await?
        }
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
