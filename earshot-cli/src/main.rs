//! earshot - music discovery and listen CLI
//!
//! Thin surface over the engine: every subcommand prints the corresponding
//! result object as JSON on stdout and exits 0; typed errors print a JSON
//! error object and exit non-zero. Logs go to stderr so stdout stays
//! machine-readable.

use clap::{Parser, Subcommand};
use earshot_core::orchestrator::{ListenOptions, ListenOrchestrator};
use earshot_core::{CacheStore, Config};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "earshot", version, about = "Discover, fetch and listen to music queries")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search all providers and print the ranked discovery result.
    Discover {
        query: String,
    },
    /// Discover and retrieve audio through the fallback chain.
    Fetch {
        query: String,
        /// Audio format requested from the extraction tool.
        #[arg(long)]
        format: Option<String>,
    },
    /// Extract audio features from a local file.
    Analyze {
        audio_path: String,
    },
    /// Run the full listen pipeline for a query.
    Listen {
        query: String,
        /// Skip the synthesis stage.
        #[arg(long)]
        no_deep_analysis: bool,
        /// Analysis mode: auto, full_audio, descriptor_only, metadata_only.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Show cache state for a key (query text or source key).
    CacheStatus {
        key: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let body = json!({
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            }
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), earshot_core::Error> {
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "earshot starting");

    let mut config = Config::load(cli.config.as_deref())?;
    if let Command::Fetch {
        format: Some(format),
        ..
    } = &cli.command
    {
        config.retrieval.output_format = format.clone();
    }

    let cache = CacheStore::open(&config.cache)
        .await
        .map_err(earshot_core::Error::from)?;
    let orchestrator = ListenOrchestrator::from_config(config)?;

    match cli.command {
        Command::Discover { query } => {
            let result = orchestrator.discover(&cache, &query).await?;
            print_json(&result)?;
        }
        Command::Fetch { query, .. } => {
            let result = orchestrator.fetch(&cache, &query).await?;
            print_json(&result)?;
        }
        Command::Analyze { audio_path } => {
            let result = orchestrator.analyze_path(&cache, &audio_path).await?;
            print_json(&result)?;
        }
        Command::Listen {
            query,
            no_deep_analysis,
            mode,
        } => {
            let options = ListenOptions {
                mode,
                deep_analysis: !no_deep_analysis,
            };
            let result = orchestrator.listen(&cache, &query, &options).await;
            print_json(&result)?;
        }
        Command::CacheStatus { key } => {
            let status = cache
                .cache_status(&key)
                .await
                .map_err(earshot_core::Error::from)?;
            print_json(&status)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), earshot_core::Error> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| earshot_core::Error::Config(format!("failed to render output: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}
