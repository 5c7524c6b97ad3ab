//! Product catalog and embedding store
//!
//! A [`CatalogSnapshot`] is an immutable, fully validated view of the catalog.
//! Serving code only ever reads snapshots; re-ingestion builds a new snapshot
//! and publishes it through [`CatalogHandle::swap`], so a request sees either
//! the old generation or the new one in full.


pub mod loader;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::similarity::cosine_similarity;
use crate::{RecError, Result};

/// A catalog entry. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    pub embedding: Vec<f32>,
}

impl Product {
    /// Text fed to the embedding model for this product
    #[inline]
    pub fn embedding_text(&self) -> String {
        embedding_text(
            &self.title,
            &self.category,
            self.description.as_deref(),
            &self.tags,
        )
    }
}

pub(crate) fn embedding_text(
    title: &str,
    category: &str,
    description: Option<&str>,
    tags: &[String],
) -> String {
    let mut parts = vec![title.trim().to_string()];
    if !category.trim().is_empty() {
        parts.push(format!("Category: {}", category.trim()));
    }
    if !tags.is_empty() {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }
    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        parts.push(description.to_string());
    }
    parts.join(". ")
}

/// Neighbor returned by [`CatalogSnapshot::nearest`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub product_id: String,
    pub similarity: f64,
}

/// Immutable, dimension-checked set of products
#[derive(Debug)]
pub struct CatalogSnapshot {
    dimension: usize,
    generation: u64,
    embedding_model: String,
    /// Sorted by product id
    products: Vec<Product>,
    index: HashMap<String, usize>,
}

impl CatalogSnapshot {
    /// Validate `products` and build a snapshot.
    ///
    /// Every vector must have exactly `dimension` finite components and
    /// product ids must be unique. Any violation is fatal for the whole load.
    #[inline]
    pub fn build(
        dimension: usize,
        embedding_model: impl Into<String>,
        mut products: Vec<Product>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(RecError::InvalidParameter(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }

        for product in &products {
            validate_embedding(&product.id, &product.embedding, dimension)?;
        }

        products.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(products.len());
        for (position, product) in products.iter().enumerate() {
            if index.insert(product.id.clone(), position).is_some() {
                return Err(RecError::InvalidParameter(format!(
                    "duplicate product id in catalog: {}",
                    product.id
                )));
            }
        }

        debug!(
            "Built catalog snapshot with {} products of dimension {}",
            products.len(),
            dimension
        );

        Ok(Self {
            dimension,
            generation: 0,
            embedding_model: embedding_model.into(),
            products,
            index,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Monotonic counter assigned when the snapshot is published
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Embedding vector of a product
    #[inline]
    pub fn lookup(&self, product_id: &str) -> Result<&[f32]> {
        self.product(product_id)
            .map(|product| product.embedding.as_slice())
            .ok_or_else(|| RecError::ProductNotFound(product_id.to_string()))
    }

    #[inline]
    pub fn product(&self, product_id: &str) -> Option<&Product> {
        self.index
            .get(product_id)
            .and_then(|&position| self.products.get(position))
    }

    #[inline]
    pub fn contains(&self, product_id: &str) -> bool {
        self.index.contains_key(product_id)
    }

    /// All `(product_id, vector)` pairs in ascending id order
    #[inline]
    pub fn all(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.products
            .iter()
            .map(|product| (product.id.as_str(), product.embedding.as_slice()))
    }

    #[inline]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Exact brute-force nearest neighbors by cosine similarity.
    ///
    /// Ties are broken by ascending product id. `exclude` is skipped, which is
    /// how "more like this" queries leave out the seed product.
    #[inline]
    pub fn nearest(
        &self,
        query: &[f32],
        limit: usize,
        exclude: Option<&str>,
    ) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RecError::EmbeddingDimensionMismatch {
                product_id: "<query>".to_string(),
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .all()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(id, vector)| Neighbor {
                product_id: id.to_string(),
                similarity: cosine_similarity(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        neighbors.truncate(limit);

        Ok(neighbors)
    }

    /// Mean of all catalog vectors, used for users without history when
    /// the centroid fallback is configured
    #[inline]
    pub fn centroid(&self) -> Option<Vec<f32>> {
        if self.products.is_empty() {
            return None;
        }

        let mut sum = vec![0.0_f64; self.dimension];
        for (_, vector) in self.all() {
            for (acc, value) in sum.iter_mut().zip(vector) {
                *acc += f64::from(*value);
            }
        }

        let count = self.products.len() as f64;
        Some(sum.into_iter().map(|value| (value / count) as f32).collect())
    }
}

fn validate_embedding(product_id: &str, embedding: &[f32], dimension: usize) -> Result<()> {
    if embedding.len() != dimension {
        return Err(RecError::EmbeddingDimensionMismatch {
            product_id: product_id.to_string(),
            expected: dimension,
            actual: embedding.len(),
        });
    }

    if let Some(position) = embedding.iter().position(|value| !value.is_finite()) {
        return Err(RecError::InvalidEmbedding {
            product_id: product_id.to_string(),
            reason: format!("component {} is not finite", position),
        });
    }

    Ok(())
}

/// Shared pointer to the current catalog snapshot
#[derive(Debug)]
pub struct CatalogHandle {
    current: ArcSwap<CatalogSnapshot>,
    /// Serializes publishers so generations stay strictly increasing
    publish: Mutex<()>,
}

impl CatalogHandle {
    #[inline]
    pub fn new(mut snapshot: CatalogSnapshot) -> Self {
        snapshot.generation = 1;
        Self {
            current: ArcSwap::from_pointee(snapshot),
            publish: Mutex::new(()),
        }
    }

    /// The snapshot to use for the whole of one request
    #[inline]
    pub fn load(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot and return its generation.
    ///
    /// In-flight readers keep the `Arc` they already loaded.
    #[inline]
    pub fn swap(&self, mut snapshot: CatalogSnapshot) -> u64 {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        snapshot.generation = self.current.load().generation + 1;
        let generation = snapshot.generation;
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));

        info!(
            "Published catalog generation {} ({} products)",
            generation, count
        );
        generation
    }
}
