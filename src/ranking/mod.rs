//! Hybrid ranking
//!
//! Blends content similarity with behavioral scores:
//!
//! ```text
//! combined = alpha * behavioral + (1 - alpha) * similarity
//! ```
//!
//! Candidates are ordered by `combined` descending with ties broken by
//! ascending product id, so identical inputs always give identical output.


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::behavior::BehavioralSource;
use crate::catalog::CatalogSnapshot;
use crate::profile::ProfileSource;
use crate::similarity::SimilarityEngine;
use crate::{RecError, Result};

/// Validated blend weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HybridConfig {
    alpha: f64,
}

impl HybridConfig {
    /// Accepts `alpha` in `[0, 1]`. Anything else is rejected, never clamped.
    #[inline]
    pub fn new(alpha: f64) -> Result<Self> {
        if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
            Ok(Self { alpha })
        } else {
            Err(RecError::InvalidParameter(format!(
                "alpha must be within [0, 1], got {alpha}"
            )))
        }
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn blend(&self, behavioral: f64, similarity: f64) -> f64 {
        self.alpha * behavioral + (1.0 - self.alpha) * similarity
    }
}

/// One ranked product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub product_id: String,
    pub content_similarity: f64,
    pub behavioral_score: f64,
    pub combined_score: f64,
    /// 1-based, dense
    pub rank: usize,
}

/// Ranks the catalog for one user against a single snapshot
pub struct HybridRanker<'a> {
    catalog: &'a CatalogSnapshot,
    profiles: &'a dyn ProfileSource,
    behavior: &'a dyn BehavioralSource,
}

impl<'a> HybridRanker<'a> {
    #[inline]
    pub fn new(
        catalog: &'a CatalogSnapshot,
        profiles: &'a dyn ProfileSource,
        behavior: &'a dyn BehavioralSource,
    ) -> Self {
        Self {
            catalog,
            profiles,
            behavior,
        }
    }

    /// Top `k` products for `user_id`.
    ///
    /// Parameters are checked before anything else is looked at. A user
    /// without a profile is [`RecError::UnknownUser`]. Products in
    /// `exclusions` never appear. A non-finite component score counts as 0,
    /// so every combined score is finite.
    #[inline]
    pub fn rank(
        &self,
        user_id: &str,
        k: i64,
        alpha: f64,
        exclusions: &HashSet<String>,
    ) -> Result<Vec<ScoredCandidate>> {
        let config = HybridConfig::new(alpha)?;
        let k = usize::try_from(k).map_err(|_| {
            RecError::InvalidParameter(format!("k must not be negative, got {k}"))
        })?;

        let profile = self
            .profiles
            .profile(user_id)
            .ok_or_else(|| RecError::UnknownUser(user_id.to_string()))?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let similarities = SimilarityEngine::new(self.catalog).score_all(&profile.vector)?;

        let mut candidates: Vec<ScoredCandidate> = self
            .catalog
            .all()
            .filter(|(product_id, _)| !exclusions.contains(*product_id))
            .map(|(product_id, _)| {
                let content_similarity = finite_or_zero(
                    "content similarity",
                    product_id,
                    similarities.get(product_id).copied().unwrap_or(0.0),
                )
                .clamp(-1.0, 1.0);
                let behavioral_score = finite_or_zero(
                    "behavioral score",
                    product_id,
                    self.behavior.score(user_id, product_id),
                )
                .clamp(0.0, 1.0);
                ScoredCandidate {
                    product_id: product_id.to_string(),
                    content_similarity,
                    behavioral_score,
                    combined_score: config.blend(behavioral_score, content_similarity),
                    rank: 0,
                }
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(k);
        for (position, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = position + 1;
        }

        debug!(
            "Ranked {} of {} products for user {} (alpha {}, k {})",
            candidates.len(),
            self.catalog.len(),
            user_id,
            config.alpha(),
            k
        );

        Ok(candidates)
    }
}

fn finite_or_zero(what: &str, product_id: &str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        warn!("Non-finite {} {} for product {}, using 0", what, value, product_id);
        0.0
    }
}

/// Combined score descending, then product id ascending
#[inline]
pub fn sort_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}
