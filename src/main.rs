//! # editkb CLI (`ekb`)
//!
//! The `ekb` binary syncs the knowledge base, queries it, and validates
//! editing plans against it.
//!
//! ## Usage
//!
//! ```bash
//! ekb --config ./config/ekb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ekb sync [--full]` | Ingest changed corpus files into the cache |
//! | `ekb search "<query>"` | Rank chunks against a query |
//! | `ekb validate <plan.json>` | Check a plan; exits 1 when invalid |
//! | `ekb docs [--kind K]` | List loaded documents by kind |
//! | `ekb graph` | Print the document reference graph as JSON |
//! | `ekb stats` | Corpus and cache statistics |
//!
//! Logs go to stderr (`-v`, `-vv`, or `RUST_LOG`); command output goes to
//! stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use editkb::config;
use editkb::embedding::create_encoder;
use editkb::repository::KnowledgeRepository;
use editkb::{docs, search, stats, sync_cmd, validate};
use editkb_core::models::DocumentKind;

/// editkb: a local knowledge base for video editing plans.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ekb.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ekb",
    about = "editkb: knowledge-base retrieval and editing-plan validation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ekb.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the corpus into the cache.
    ///
    /// Unchanged files (by SHA-256) are reused from the previous sync.
    Sync {
        /// Ignore the cache and rebuild every document.
        #[arg(long)]
        full: bool,
    },

    /// Search the knowledge base.
    Search {
        /// Query text.
        query: String,

        /// Number of hits (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print prompt-ready `heading: text` lines.
        #[arg(long)]
        summary: bool,
    },

    /// Validate an editing plan (JSON).
    Validate {
        /// Plan file.
        plan: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List loaded documents grouped by kind.
    Docs {
        /// Only this kind (guideline, definition, example, schema, glossary, catalog).
        #[arg(long)]
        kind: Option<DocumentKind>,
    },

    /// Print the document reference graph as JSON.
    Graph,

    /// Show corpus and cache statistics.
    Stats,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "editkb=info,editkb_core=info",
        1 => "editkb=debug,editkb_core=debug",
        _ => "editkb=trace,editkb_core=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cfg = Arc::new(config::load_config(&cli.config)?);
    let encoder = create_encoder(&cfg.embedding)?;
    let repo = KnowledgeRepository::new(cfg, encoder);

    match cli.command {
        Commands::Sync { full } => {
            sync_cmd::run_sync(&repo, full).await?;
        }
        Commands::Search {
            query,
            top_k,
            summary,
        } => {
            search::run_search(&repo, &query, top_k, summary).await?;
        }
        Commands::Validate { plan, json } => {
            let report = validate::run_validate(&repo, &plan, json).await?;
            if !report.is_valid {
                std::process::exit(1);
            }
        }
        Commands::Docs { kind } => {
            docs::run_docs(&repo, kind).await?;
        }
        Commands::Graph => {
            docs::run_graph(&repo).await?;
        }
        Commands::Stats => {
            stats::run_stats(&repo).await?;
        }
    }

    Ok(())
}
