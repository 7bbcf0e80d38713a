//! Command-line access to a knowledge codex.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codex_knowledge::{Codex, EntryRef, NewEntry, ReorganizePlan};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "codex-knowledge", about = "Maintain an error/learning codex")]
struct Cli {
    /// Codex root directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record an observed error.
    Error {
        #[arg(long)]
        title: String,
        #[arg(long)]
        context: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        correction: String,
        #[arg(long)]
        prevention: String,
        /// Related entry tags, comma separated.
        #[arg(long, value_delimiter = ',')]
        related: Vec<EntryRef>,
    },

    /// Record a learning.
    Learning {
        #[arg(long)]
        title: String,
        #[arg(long)]
        context: String,
        #[arg(long)]
        insight: String,
        #[arg(long)]
        application: String,
        #[arg(long)]
        impact: String,
        #[arg(long, value_delimiter = ',')]
        related: Vec<EntryRef>,
    },

    /// Split categories out of the main index into partition files.
    Reorganize {
        /// Only extract these categories.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Do nothing unless the inline threshold is exceeded.
        #[arg(long)]
        if_needed: bool,
    },

    /// Print an entry as JSON.
    Lookup { tag: EntryRef },

    /// Print where an entry's record lives.
    Resolve { tag: EntryRef },

    /// Audit every related link.
    Check,

    /// Print entry and partition counts.
    Status,
}

fn with_related(mut entry: NewEntry, related: Vec<EntryRef>) -> NewEntry {
    entry.related.extend(related);
    entry
}

async fn run(cli: Cli) -> Result<()> {
    let codex = Codex::open(&cli.root)
        .await
        .with_context(|| format!("failed to open codex at {}", cli.root.display()))?;
    debug!("Running {:?}", cli.command);

    match cli.command {
        Command::Error {
            title,
            context,
            description,
            correction,
            prevention,
            related,
        } => {
            let entry = NewEntry::error(title, context, description, correction, prevention);
            let tag = codex.submit_entry(with_related(entry, related)).await?;
            println!("{tag}");
        }
        Command::Learning {
            title,
            context,
            insight,
            application,
            impact,
            related,
        } => {
            let entry = NewEntry::learning(title, context, insight, application, impact);
            let tag = codex.submit_entry(with_related(entry, related)).await?;
            println!("{tag}");
        }
        Command::Reorganize {
            categories,
            if_needed,
        } => {
            let plan = if categories.is_empty() {
                ReorganizePlan::all()
            } else {
                ReorganizePlan::only(&categories)
            };
            if if_needed && !codex.needs_reorganization().await {
                println!(
                    "{} is within the split threshold of {} inline entries",
                    codex.config().index_file,
                    codex.config().split_threshold
                );
                return Ok(());
            }
            let report = codex.reorganize(plan).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Lookup { tag } => {
            let entry = codex.lookup(tag).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Resolve { tag } => {
            let resolved = codex.resolve(tag).await?;
            println!("{}#{}", resolved.file, resolved.anchor);
        }
        Command::Check => {
            let report = codex.check_references().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                anyhow::bail!("{} dangling references", report.dangling.len());
            }
        }
        Command::Status => {
            let stats = codex.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
