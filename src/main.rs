use anyhow::Result;
use clap::{Parser, Subcommand};
use hybrid_rec::commands::{
    ingest_catalog, load_config, log_interaction, recommend, serve_mcp, show_status, similar,
};
use hybrid_rec::config::{resolve_data_dir, run_interactive_config, show_config};
use hybrid_rec::service::RecommendationRequest;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hybrid-rec")]
#[command(about = "Hybrid product recommender with explanations and an MCP server")]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml and the database (default: ~/.hybrid-rec)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding model, explainer and ranking defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Import a JSONL product catalog, replacing the stored one
    Ingest {
        /// Catalog file, one product per line
        file: PathBuf,
        /// Re-embed every product, ignoring vectors in the file
        #[arg(long)]
        reembed: bool,
    },
    /// Record a user interaction
    Log {
        user: String,
        product: String,
        /// Signal strength, at most 1000000
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
        /// Explicit signal (purchase, rating) instead of a view or click
        #[arg(long)]
        explicit: bool,
    },
    /// Recommend products for a user
    Recommend {
        user: String,
        /// Number of products (default from config)
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,
        /// Weight of behavior versus content similarity, in [0, 1]
        #[arg(long)]
        alpha: Option<f64>,
        /// Product ids to leave out
        #[arg(long, num_args = 1..)]
        exclude: Vec<String>,
        /// Skip explanation generation
        #[arg(long)]
        no_explanations: bool,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Products most similar to a given product
    Similar {
        product: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show catalog and interaction statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&data_dir)?;
            } else {
                run_interactive_config(&data_dir)?;
            }
        }
        Commands::Ingest { file, reembed } => {
            ingest_catalog(&load_config(&data_dir)?, &file, reembed).await?;
        }
        Commands::Log {
            user,
            product,
            weight,
            explicit,
        } => {
            log_interaction(&load_config(&data_dir)?, &user, &product, weight, explicit).await?;
        }
        Commands::Recommend {
            user,
            k,
            alpha,
            exclude,
            no_explanations,
            json,
        } => {
            let request = RecommendationRequest {
                user_id: user,
                k,
                alpha,
                exclude,
                exclude_consumed: None,
                skip_explanations: no_explanations,
            };
            recommend(&load_config(&data_dir)?, request, json).await?;
        }
        Commands::Similar { product, limit } => {
            similar(&load_config(&data_dir)?, &product, limit).await?;
        }
        Commands::Serve => {
            serve_mcp(&load_config(&data_dir)?).await?;
        }
        Commands::Status => {
            show_status(&load_config(&data_dir)?).await?;
        }
    }

    Ok(())
}
