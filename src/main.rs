use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codepilot::config::{Config, DEFAULT_CONFIG_PATH};
use codepilot::embedder::mock::MockEmbedder;
use codepilot::indexer::core::Indexer;
use codepilot::retriever::Retriever;
use codepilot::store::{IndexPaths, VectorIndex};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Index Python sources and query them by similarity.
#[derive(Parser)]
#[command(name = "codepilot", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, chunk and embed every Python file under a directory.
    Index {
        /// Directory to scan recursively.
        dir: PathBuf,
    },

    /// Rank indexed chunks against a query.
    Query {
        text: String,

        /// Number of results (defaults to `search_top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show index size and state.
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let dimensions = config.embedding.dimensions;
    let mut index = VectorIndex::open(IndexPaths::from_config(&config), dimensions);
    // Embedding is an external service; the mock keeps the pipeline usable offline.
    let embedder = MockEmbedder::new(dimensions);

    match cli.command {
        Commands::Index { dir } => {
            let mut indexer = Indexer::new(&mut index, &embedder, &config)
                .context("failed to initialize Python parser")?;
            let report = indexer.index_directory(&dir)?;
            println!(
                "Indexed {} files ({} failed, {} directories skipped): {} units, {} chunks",
                report.files_parsed,
                report.files_failed,
                report.dirs_skipped,
                report.units,
                report.chunks
            );
        }
        Commands::Query { text, top_k } => {
            let k = top_k.unwrap_or(config.search_top_k);
            let results = Retriever::new(&index, &embedder).retrieve(&text, k);
            if results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in results.iter().enumerate() {
                let m = &r.metadata;
                let lines = match (m.start_line, m.end_line) {
                    (Some(s), Some(e)) => format!(":{s}-{e}"),
                    _ => String::new(),
                };
                println!(
                    "{}. [{:.3}] {} {} ({}{lines}, chunk {}/{})",
                    rank + 1,
                    r.relevance_score,
                    m.kind.as_str(),
                    m.name.as_deref().unwrap_or("-"),
                    m.file_path,
                    m.chunk_index + 1,
                    m.chunk_count
                );
                println!("{}\n", r.content);
            }
        }
        Commands::Stats => {
            let paths = IndexPaths::from_config(&config);
            println!("vectors:   {}", paths.vectors.display());
            println!("metadata:  {}", paths.metadata.display());
            println!("state:     {:?}", index.state());
            println!(
                "dimension: {}",
                index
                    .dimension()
                    .map_or_else(|| "unset".to_string(), |d| d.to_string())
            );
            println!("chunks:    {}", index.len());
        }
    }

    Ok(())
}
