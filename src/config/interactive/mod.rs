
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, ExplainerConfig, OllamaConfig, RankingConfig};

#[inline]
pub fn run_interactive_config(data_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Hybrid Recommender Configuration").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(data_dir)?;

    eprintln!("{}", style("Embedding Model").bold().yellow());
    eprintln!("Ollama model used to embed product text during catalog ingestion.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Explanations").bold().yellow());
    configure_explainer(&mut config.explainer)?;

    eprintln!();
    eprintln!("{}", style("Ranking").bold().yellow());
    configure_ranking(&mut config.ranking)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but catalog ingestion needs Ollama for products without vectors.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(data_dir: &Path) -> Result<()> {
    let config = Config::load(data_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Explainer Settings:").bold().yellow());
    eprintln!("  Enabled: {}", style(config.explainer.enabled).cyan());
    eprintln!("  Model: {}", style(&config.explainer.model).cyan());
    eprintln!(
        "  Timeout: {}",
        style(format!("{}ms", config.explainer.timeout_ms)).cyan()
    );
    eprintln!(
        "  Cache TTL: {}",
        style(format!("{}s", config.explainer.cache_ttl_seconds)).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Ranking Settings:").bold().yellow());
    eprintln!("  Alpha: {}", style(config.ranking.alpha).cyan());
    eprintln!("  Default K: {}", style(config.ranking.default_k).cyan());
    eprintln!(
        "  Exclude consumed: {}",
        style(config.ranking.exclude_consumed).cyan()
    );
    eprintln!(
        "  Unknown users: {}",
        style(format!("{:?}", config.ranking.unknown_user_policy)).cyan()
    );
    eprintln!(
        "  Half-life: {}",
        style(format!("{} days", config.ranking.half_life_days)).cyan()
    );

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config(data_dir: &Path) -> Result<Config> {
    Config::load(data_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: data_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (2..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 2 and 4096")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(dimension)?;

    Ok(())
}

fn configure_explainer(explainer: &mut ExplainerConfig) -> Result<()> {
    explainer.enabled = Confirm::new()
        .with_prompt("Generate explanations with an LLM?")
        .default(explainer.enabled)
        .interact()?;

    if !explainer.enabled {
        return Ok(());
    }

    let model: String = Input::new()
        .with_prompt("Explanation model")
        .default(explainer.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_ms: u64 = Input::new()
        .with_prompt("Per-explanation timeout (ms)")
        .default(explainer.timeout_ms)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (100..=120_000).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 100 and 120000 ms")
            }
        })
        .interact_text()?;

    explainer.set_model(model)?;
    explainer.set_timeout_ms(timeout_ms)?;

    Ok(())
}

fn configure_ranking(ranking: &mut RankingConfig) -> Result<()> {
    let alpha: f64 = Input::new()
        .with_prompt("Blend weight alpha (0 = pure content, 1 = pure behavior)")
        .default(ranking.alpha)
        .validate_with(|input: &f64| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Alpha must be between 0 and 1")
            }
        })
        .interact_text()?;

    let default_k: u32 = Input::new()
        .with_prompt("Default number of recommendations")
        .default(ranking.default_k)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Default k must be between 1 and 100")
            }
        })
        .interact_text()?;

    ranking.exclude_consumed = Confirm::new()
        .with_prompt("Exclude products the user already purchased or rated?")
        .default(ranking.exclude_consumed)
        .interact()?;

    ranking.set_alpha(alpha)?;
    ranking.set_default_k(default_k)?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
