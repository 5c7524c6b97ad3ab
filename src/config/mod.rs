// Configuration management module
// TOML settings for the embedding model, explainer and ranking defaults

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, ExplainerConfig, MetricsConfig, OllamaConfig, RankingConfig,
    UnknownUserPolicy,
};

/// Resolve the data directory, falling back to `~/.hybrid-rec`
#[inline]
pub fn resolve_data_dir(
    data_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match data_dir {
        Some(dir) => Ok(dir),
        None => Config::default_dir(),
    }
}
