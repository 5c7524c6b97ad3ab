
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::behavior::{InteractionRecord, SignalKind};
use crate::catalog::Product;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProductRow {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    /// JSON array
    pub tags: String,
    pub price: Option<f64>,
    /// JSON document
    pub metadata: Option<String>,
    pub embedding: Vec<u8>,
    pub updated_date: NaiveDateTime,
}

impl ProductRow {
    #[inline]
    pub fn from_product(product: &Product, updated_date: NaiveDateTime) -> Result<Self> {
        Ok(Self {
            id: product.id.clone(),
            title: product.title.clone(),
            category: product.category.clone(),
            description: product.description.clone(),
            tags: serde_json::to_string(&product.tags).context("Failed to serialize tags")?,
            price: product.price,
            metadata: product
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize metadata")?,
            embedding: encode_embedding(&product.embedding),
            updated_date,
        })
    }

    #[inline]
    pub fn into_product(self) -> Result<Product> {
        let tags = serde_json::from_str(&self.tags)
            .with_context(|| format!("Invalid tags stored for product {}", self.id))?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("Invalid metadata stored for product {}", self.id))?;
        let embedding = decode_embedding(&self.embedding)
            .with_context(|| format!("Invalid embedding stored for product {}", self.id))?;

        Ok(Product {
            id: self.id,
            title: self.title,
            category: self.category,
            description: self.description,
            tags,
            price: self.price,
            metadata,
            embedding,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogMeta {
    pub dimension: i64,
    pub embedding_model: String,
    pub product_count: i64,
    pub ingested_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct InteractionRow {
    pub id: i64,
    pub user_id: String,
    pub product_id: String,
    pub strength: f64,
    pub kind: String,
    pub created_date: DateTime<Utc>,
}

impl InteractionRow {
    #[inline]
    pub fn into_record(self) -> Result<InteractionRecord> {
        let kind = self
            .kind
            .parse::<SignalKind>()
            .with_context(|| format!("Invalid signal kind stored for interaction {}", self.id))?;

        InteractionRecord::new(
            self.user_id,
            self.product_id,
            self.strength,
            kind,
            self.created_date,
        )
        .with_context(|| format!("Invalid interaction stored with id {}", self.id))
    }
}

/// Little-endian `f32` bytes
#[inline]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect()
}

#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(anyhow::anyhow!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
