use anyhow::{Context, Result};
use console::style;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::behavior::SignalKind;
use crate::catalog::loader::{MaterializeOptions, materialize, read_catalog_file};
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::mcp::create_server;
use crate::service::{RecommendationRequest, RecommendationResponse, RecommendationService};

/// Load the configuration stored in `data_dir`
#[inline]
pub fn load_config(data_dir: &Path) -> Result<Config> {
    Config::load(data_dir).context("Failed to load configuration")
}

async fn open_service(config: &Config) -> Result<RecommendationService> {
    RecommendationService::from_config(config)
        .await
        .context("Failed to open recommender")
}

/// Import a JSONL catalog, embedding products that carry no vector, and
/// replace the stored catalog with it
#[inline]
pub async fn ingest_catalog(config: &Config, path: &Path, reembed: bool) -> Result<()> {
    info!("Ingesting catalog from {}", path.display());

    let entries = read_catalog_file(path)?;
    let needs_embedding = reembed || entries.iter().any(|entry| entry.embedding.is_none());

    let client = if needs_embedding {
        let client = OllamaClient::new(config).context("Failed to create Ollama client")?;
        client.health_check().with_context(|| {
            format!(
                "Ollama is not reachable at {}:{}. Use 'hybrid-rec config' to update connection settings.",
                config.ollama.host, config.ollama.port
            )
        })?;
        Some(client)
    } else {
        None
    };

    let options = MaterializeOptions {
        dimension: config.ollama.embedding_dimension as usize,
        reembed,
        batch_size: config.ollama.batch_size as usize,
        show_progress: true,
    };

    let products = tokio::task::spawn_blocking(move || {
        materialize(
            entries,
            client.as_ref().map(|c| c as &dyn Embedder),
            options,
        )
    })
    .await
    .context("Embedding task failed")??;

    let count = products.len();
    let service = open_service(config).await?;
    let generation = service
        .ingest(products, options.dimension, &config.ollama.model)
        .await?;

    println!(
        "{} Imported {} products (catalog generation {})",
        style("✓").green(),
        count,
        generation
    );
    Ok(())
}

/// Append one interaction to the log
#[inline]
pub async fn log_interaction(
    config: &Config,
    user_id: &str,
    product_id: &str,
    weight: f64,
    explicit: bool,
) -> Result<()> {
    let kind = if explicit {
        SignalKind::Explicit
    } else {
        SignalKind::Implicit
    };

    let service = open_service(config).await?;
    let record = service
        .log_interaction(user_id, product_id, weight, kind)
        .await?;

    println!(
        "{} Logged {} interaction: {} → {} (weight {})",
        style("✓").green(),
        record.kind,
        record.user_id,
        record.product_id,
        record.strength
    );
    Ok(())
}

/// Print recommendations for one user
#[inline]
pub async fn recommend(config: &Config, request: RecommendationRequest, json: bool) -> Result<()> {
    let service = open_service(config).await?;
    let response = service.recommend(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", format_recommendations(&response));
    }
    Ok(())
}

/// Human-readable rendering of a recommendation response
#[inline]
pub fn format_recommendations(response: &RecommendationResponse) -> String {
    let mut out = String::new();

    if response.items.is_empty() {
        let _ = writeln!(out, "No recommendations for {}.", response.user_id);
        return out;
    }

    let _ = writeln!(
        out,
        "Recommendations for {} (alpha {}, catalog generation {}):",
        response.user_id, response.model.alpha, response.model.catalog_generation
    );
    if response.fallback_profile {
        let _ = writeln!(out, "  (no history yet, ranked against the whole catalog)");
    }

    for item in &response.items {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}. {} [{}]  score {:.3} (similarity {:.3}, behavior {:.3})",
            item.rank,
            item.title,
            item.product_id,
            item.score,
            item.content_similarity,
            item.behavioral_score
        );
        let _ = writeln!(out, "   {}", item.blurb);
        if let Some(explanation) = &item.explanation {
            let source = item
                .explanation_source
                .map(|s| s.as_str())
                .unwrap_or_default();
            let _ = writeln!(out, "   Why: {} ({})", explanation, source);
        }
    }

    out
}

/// Print the products closest to `product_id`
#[inline]
pub async fn similar(config: &Config, product_id: &str, limit: usize) -> Result<()> {
    let service = open_service(config).await?;
    let similar = service.similar_products(product_id, limit)?;

    if similar.is_empty() {
        println!("No similar products for {}.", product_id);
        return Ok(());
    }

    println!("Products similar to {}:", product_id);
    for (position, product) in similar.iter().enumerate() {
        println!(
            "  {}. {} [{}]  {:.3}",
            position + 1,
            product.title,
            product.product_id,
            product.similarity
        );
    }
    Ok(())
}

/// Show catalog, interaction log and explainer status
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let service = open_service(config).await?;
    let status = service.status().await?;
    let model = service.model_info();

    println!("{}", style("📊 Recommender Status").bold().cyan());
    println!();
    println!("{}", style("Catalog:").bold().yellow());
    println!("   📦 Products: {}", status.catalog_size);
    println!("   📐 Dimension: {}", status.dimension);
    println!("   🧠 Embedding model: {}", status.embedding_model);
    println!("   🔁 Generation: {}", status.catalog_generation);
    println!();
    println!("{}", style("Interactions:").bold().yellow());
    println!("   👤 Users: {}", status.users);
    println!("   📝 Logged interactions: {}", status.interactions);
    println!();
    println!("{}", style("Model:").bold().yellow());
    println!("   ⚖️  Alpha: {}", model.alpha);
    println!(
        "   🎯 Hit rate@{}: {}",
        model.evaluated_k,
        model
            .hit_rate_at_k
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
    );
    println!(
        "   🎯 NDCG@{}: {}",
        model.evaluated_k,
        model
            .ndcg_at_k
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
    );
    println!(
        "   💬 Explanations: {}",
        if status.explanations_enabled {
            format!("enabled ({})", config.explainer.model)
        } else {
            "disabled".to_string()
        }
    );

    if status.catalog_size == 0 {
        println!();
        println!("💡 Use 'hybrid-rec ingest <file>' to import a catalog");
    }

    Ok(())
}

/// Serve the recommender tools on stdio until EOF or Ctrl+C
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    if config.explainer.enabled {
        match config.explainer.explainer_url() {
            Ok(url) => {
                let client =
                    OllamaClient::with_base_url(url, config.explainer.model.clone(), 1)
                        .with_retry_attempts(1);
                let checked = tokio::task::spawn_blocking(move || client.health_check()).await;
                match checked {
                    Ok(Ok(())) => info!("Explainer reachable at {}", config.explainer.host),
                    Ok(Err(e)) => {
                        warn!("Explainer unavailable, serving fallback explanations: {}", e);
                    }
                    Err(e) => warn!("Explainer health check failed: {}", e),
                }
            }
            Err(e) => warn!("Invalid explainer URL: {}", e),
        }
    }

    let service = Arc::new(open_service(config).await?);
    let catalog_size = service.catalog().len();
    if catalog_size == 0 {
        warn!("Serving an empty catalog; run 'hybrid-rec ingest <file>' first");
    }

    let server = create_server(service).await;

    eprintln!(
        "{} Serving {} products over stdio. Press Ctrl+C to stop.",
        style("🌐").cyan(),
        catalog_size
    );

    tokio::select! {
        result = server.serve_stdio() => {
            if let Err(e) = &result {
                error!("MCP server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    Ok(())
}
