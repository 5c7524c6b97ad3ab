//! Cosine similarity between user profiles and catalog vectors


use std::collections::HashMap;

use crate::catalog::CatalogSnapshot;
use crate::{RecError, Result};

/// Cosine similarity of two vectors in `[-1, 1]`.
///
/// Accumulates in `f64`. Returns `0.0` when either vector has zero norm or
/// when the lengths differ, so an uninformative vector never ranks a product
/// up or down.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    (dot / denominator).clamp(-1.0, 1.0)
}

/// Scores every catalog product against a query vector
#[derive(Debug, Clone, Copy)]
pub struct SimilarityEngine<'a> {
    catalog: &'a CatalogSnapshot,
}

impl<'a> SimilarityEngine<'a> {
    #[inline]
    pub fn new(catalog: &'a CatalogSnapshot) -> Self {
        Self { catalog }
    }

    /// Similarity of `query` to one product
    #[inline]
    pub fn score(&self, query: &[f32], product_id: &str) -> Result<f64> {
        self.check_dimension(query)?;
        let vector = self.catalog.lookup(product_id)?;
        Ok(cosine_similarity(query, vector))
    }

    /// Similarity of `query` to every product in the catalog
    #[inline]
    pub fn score_all(&self, query: &[f32]) -> Result<HashMap<String, f64>> {
        self.check_dimension(query)?;
        Ok(self
            .catalog
            .all()
            .map(|(id, vector)| (id.to_string(), cosine_similarity(query, vector)))
            .collect())
    }

    fn check_dimension(&self, query: &[f32]) -> Result<()> {
        if query.len() == self.catalog.dimension() {
            Ok(())
        } else {
            Err(RecError::EmbeddingDimensionMismatch {
                product_id: "<profile>".to_string(),
                expected: self.catalog.dimension(),
                actual: query.len(),
            })
        }
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value = (f64::from(*value) / norm) as f32;
        }
    }
}
