//! Text embedding used when ingesting catalog entries without vectors

pub mod ollama;

pub use ollama::{ModelInfo, OllamaClient};

/// Turns product text into dense vectors.
///
/// Implementations are blocking; async callers wrap them in
/// `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside the catalog so reports can name it
    fn model_name(&self) -> &str;

    /// Embed `texts`, returning exactly one vector per input in order
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
