//! User profiles built from interaction history


use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

use crate::behavior::InteractionRecord;
use crate::catalog::CatalogSnapshot;
use crate::similarity::normalize;

const DEFAULT_INTEREST_TERMS: usize = 3;

/// A user's derived taste vector plus the history it came from.
///
/// Read-only to ranking; rebuilt per request.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    /// Unit-length weighted mean of interacted product vectors
    pub vector: Vec<f32>,
    /// Newest first
    pub history: Vec<InteractionRecord>,
    /// Dominant categories, strongest first
    pub interest_terms: Vec<String>,
}

impl UserProfile {
    /// Distinct product ids from the history, newest first
    #[inline]
    pub fn recent_product_ids(&self, limit: usize) -> Vec<&str> {
        self.history
            .iter()
            .map(|record| record.product_id.as_str())
            .unique()
            .take(limit)
            .collect()
    }

    #[inline]
    pub fn has_interacted(&self, product_id: &str) -> bool {
        self.history
            .iter()
            .any(|record| record.product_id == product_id)
    }
}

/// Where the ranker gets profiles from
pub trait ProfileSource {
    fn profile(&self, user_id: &str) -> Option<&UserProfile>;
}

impl ProfileSource for UserProfile {
    #[inline]
    fn profile(&self, user_id: &str) -> Option<&UserProfile> {
        (self.user_id == user_id).then_some(self)
    }
}

impl ProfileSource for HashMap<String, UserProfile> {
    #[inline]
    fn profile(&self, user_id: &str) -> Option<&UserProfile> {
        self.get(user_id)
    }
}

impl ProfileSource for [UserProfile] {
    #[inline]
    fn profile(&self, user_id: &str) -> Option<&UserProfile> {
        self.iter().find(|profile| profile.user_id == user_id)
    }
}

/// Builds profiles against one catalog snapshot
#[derive(Debug, Clone, Copy)]
pub struct ProfileBuilder<'a> {
    catalog: &'a CatalogSnapshot,
    as_of: DateTime<Utc>,
    half_life_days: f64,
    interest_terms: usize,
}

impl<'a> ProfileBuilder<'a> {
    #[inline]
    pub fn new(catalog: &'a CatalogSnapshot, as_of: DateTime<Utc>, half_life_days: f64) -> Self {
        Self {
            catalog,
            as_of,
            half_life_days,
            interest_terms: DEFAULT_INTEREST_TERMS,
        }
    }

    #[inline]
    pub fn with_interest_terms(mut self, count: usize) -> Self {
        self.interest_terms = count;
        self
    }

    /// Profile from `history`, or `None` when none of it resolves to a
    /// catalog product.
    ///
    /// Each product vector is weighted by `strength · decay`. When every
    /// weight is zero the interacted vectors are averaged uniformly.
    #[inline]
    pub fn build(&self, user_id: &str, history: &[InteractionRecord]) -> Option<UserProfile> {
        let resolved: Vec<(&InteractionRecord, f64)> = history
            .iter()
            .filter(|record| record.user_id == user_id)
            .filter(|record| self.catalog.contains(&record.product_id))
            .map(|record| {
                let weight = record.strength * record.decay_weight(self.as_of, self.half_life_days);
                (record, weight)
            })
            .collect();

        if resolved.is_empty() {
            debug!("No catalog products in history of user {}", user_id);
            return None;
        }

        let total_weight: f64 = resolved.iter().map(|(_, weight)| weight).sum();
        let uniform = !total_weight.is_finite() || total_weight <= 0.0;

        let mut sum = vec![0.0_f64; self.catalog.dimension()];
        let mut category_weights: HashMap<&str, f64> = HashMap::new();

        for (record, weight) in &resolved {
            let weight = if uniform { 1.0 } else { *weight / total_weight };
            let Some(product) = self.catalog.product(&record.product_id) else {
                continue;
            };
            for (acc, value) in sum.iter_mut().zip(&product.embedding) {
                *acc += weight * f64::from(*value);
            }
            let category = product.category.trim();
            if !category.is_empty() {
                *category_weights.entry(category).or_default() += weight;
            }
        }

        let mut vector: Vec<f32> = sum.into_iter().map(|value| value as f32).collect();
        normalize(&mut vector);

        let interest_terms = category_weights
            .into_iter()
            .sorted_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)))
            .take(self.interest_terms)
            .map(|(category, _)| category.to_string())
            .collect();

        let history = history
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .sorted_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| a.product_id.cmp(&b.product_id))
            })
            .collect();

        Some(UserProfile {
            user_id: user_id.to_string(),
            vector,
            history,
            interest_terms,
        })
    }

    /// Profile pointing at the catalog centroid, for users without history
    #[inline]
    pub fn centroid(&self, user_id: &str) -> Option<UserProfile> {
        let mut vector = self.catalog.centroid()?;
        normalize(&mut vector);
        Some(UserProfile {
            user_id: user_id.to_string(),
            vector,
            history: Vec::new(),
            interest_terms: Vec::new(),
        })
    }
}
