//! JSONL catalog import
//!
//! Upstream catalog dumps are not uniform: ids arrive as `id`, `product_id`
//! or `productId`, sometimes as numbers, and tags come either as a list or a
//! comma-separated string. [`CatalogEntry`] accepts all of these and
//! [`materialize`] turns entries into validated [`Product`]s, embedding the
//! ones that carry no vector.

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Product, embedding_text, validate_embedding};
use crate::embeddings::Embedder;
use crate::{RecError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Text(String),
    Number(i64),
}

impl EntryId {
    fn normalized(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EntryTags {
    List(Vec<String>),
    Joined(String),
}

impl EntryTags {
    fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(tags) => tags.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One line of a catalog file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    #[serde(alias = "product_id", alias = "productId")]
    pub id: EntryId,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<EntryTags>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl CatalogEntry {
    #[inline]
    pub fn product_id(&self) -> String {
        self.id.normalized()
    }

    /// Title, falling back to a placeholder built from the id
    #[inline]
    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map_or_else(|| format!("Product {}", self.product_id()), str::to_string)
    }

    #[inline]
    pub fn tags(&self) -> Vec<String> {
        self.tags
            .as_ref()
            .map(EntryTags::normalized)
            .unwrap_or_default()
    }

    /// Text sent to the embedding model
    #[inline]
    pub fn embedding_text(&self) -> String {
        embedding_text(
            &self.display_title(),
            self.category.as_deref().unwrap_or_default(),
            self.description.as_deref(),
            &self.tags(),
        )
    }

    fn into_product(self, embedding: Vec<f32>) -> Product {
        Product {
            id: self.product_id(),
            title: self.display_title(),
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            tags: self.tags(),
            price: self.price.filter(|p| p.is_finite()),
            metadata: self.metadata,
            embedding,
        }
    }
}

/// Parse JSONL entries. Blank lines are skipped; a malformed line is an
/// error naming its line number.
#[inline]
pub fn parse_catalog<R: BufRead>(reader: R) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: CatalogEntry = serde_json::from_str(trimmed).map_err(|e| {
            RecError::InvalidParameter(format!("catalog line {}: {}", index + 1, e))
        })?;

        if entry.product_id().is_empty() {
            return Err(RecError::InvalidParameter(format!(
                "catalog line {}: empty product id",
                index + 1
            )));
        }

        entries.push(entry);
    }

    debug!("Parsed {} catalog entries", entries.len());
    Ok(entries)
}

#[inline]
pub fn read_catalog_file(path: &Path) -> Result<Vec<CatalogEntry>> {
    let file = File::open(path).map_err(|e| {
        RecError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open catalog {}: {}", path.display(), e),
        ))
    })?;
    parse_catalog(BufReader::new(file))
}

/// Options for [`materialize`]
#[derive(Debug, Clone, Copy)]
pub struct MaterializeOptions {
    pub dimension: usize,
    /// Embed every entry, ignoring vectors present in the file
    pub reembed: bool,
    pub batch_size: usize,
    pub show_progress: bool,
}

/// Turn entries into products with validated vectors.
///
/// Entries lacking a vector (or all entries when `reembed` is set) are
/// embedded in batches. Without an embedder such entries are an error. Any
/// vector of the wrong length fails the whole import.
#[inline]
pub fn materialize(
    entries: Vec<CatalogEntry>,
    embedder: Option<&dyn Embedder>,
    options: MaterializeOptions,
) -> Result<Vec<Product>> {
    if entries.is_empty() {
        warn!("Catalog import has no entries");
    }

    let (ready, pending): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.embedding.is_some() && !options.reembed);

    let mut products = Vec::with_capacity(ready.len() + pending.len());
    for mut entry in ready {
        let embedding = entry.embedding.take().unwrap_or_default();
        let product = entry.into_product(embedding);
        validate_embedding(&product.id, &product.embedding, options.dimension)?;
        products.push(product);
    }

    if pending.is_empty() {
        info!("All {} catalog entries carry embeddings", products.len());
        return Ok(products);
    }

    let embedder = embedder.ok_or_else(|| {
        RecError::Embedding(format!(
            "{} catalog entries have no embedding and no embedding model is available",
            pending.len()
        ))
    })?;

    info!(
        "Embedding {} catalog entries with {}",
        pending.len(),
        embedder.model_name()
    );

    let progress = if options.show_progress {
        ProgressBar::new(pending.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    };

    let batch_size = options.batch_size.max(1);
    let mut pending = pending.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<CatalogEntry> = pending.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(CatalogEntry::embedding_text).collect();

        let vectors = embedder
            .embed_batch(&texts)
            .map_err(|e| RecError::Embedding(format!("{e:#}")))?;
        if vectors.len() != batch.len() {
            return Err(RecError::Embedding(format!(
                "embedding model returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }

        for (entry, vector) in batch.into_iter().zip(vectors) {
            let product = entry.into_product(vector);
            validate_embedding(&product.id, &product.embedding, options.dimension)?;
            progress.set_message(product.id.clone());
            progress.inc(1);
            products.push(product);
        }
    }

    progress.finish_and_clear();
    Ok(products)
}
