//! Behavioral scores derived from the interaction log
//!
//! A behavioral score says how strongly a user has engaged with a product,
//! independent of what the product is about. Scores live in `[0, 1)` so they
//! blend on the same footing as cosine similarity.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::{RecError, Result};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Largest accepted interaction strength
pub const MAX_INTERACTION_STRENGTH: f64 = 1_000_000.0;

/// Kind of interaction signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Views, clicks, add-to-cart
    #[default]
    Implicit,
    /// Purchases and ratings
    Explicit,
}

impl SignalKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Implicit => "implicit",
            Self::Explicit => "explicit",
        }
    }
}

impl fmt::Display for SignalKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = RecError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "implicit" => Ok(Self::Implicit),
            "explicit" => Ok(Self::Explicit),
            other => Err(RecError::InvalidParameter(format!(
                "unknown signal kind: {other}"
            ))),
        }
    }
}

/// One logged interaction. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: String,
    pub product_id: String,
    pub strength: f64,
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    /// Build a record, rejecting empty ids and strengths outside
    /// `[0, MAX_INTERACTION_STRENGTH]`
    #[inline]
    pub fn new(
        user_id: impl Into<String>,
        product_id: impl Into<String>,
        strength: f64,
        kind: SignalKind,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let user_id = user_id.into().trim().to_string();
        let product_id = product_id.into().trim().to_string();

        if user_id.is_empty() {
            return Err(RecError::InvalidParameter(
                "user id must not be empty".to_string(),
            ));
        }
        if product_id.is_empty() {
            return Err(RecError::InvalidParameter(
                "product id must not be empty".to_string(),
            ));
        }
        if !(0.0..=MAX_INTERACTION_STRENGTH).contains(&strength) {
            return Err(RecError::InvalidParameter(format!(
                "interaction strength must be within [0, {}], got {}",
                MAX_INTERACTION_STRENGTH, strength
            )));
        }

        Ok(Self {
            user_id,
            product_id,
            strength,
            kind,
            timestamp,
        })
    }

    /// Half-life weighting of this record relative to `as_of`.
    ///
    /// Records dated after `as_of` count as fresh.
    #[inline]
    pub fn decay_weight(&self, as_of: DateTime<Utc>, half_life_days: f64) -> f64 {
        let age_seconds = (as_of - self.timestamp).num_milliseconds().max(0) as f64 / 1000.0;
        0.5_f64.powf(age_seconds / SECONDS_PER_DAY / half_life_days)
    }
}

/// Per-(user, product) behavioral score in `[0, 1]`.
///
/// Products a user never interacted with score 0.
pub trait BehavioralSource: Send + Sync {
    fn score(&self, user_id: &str, product_id: &str) -> f64;
}

/// Decay and saturation parameters for [`DecayedInteractionScores`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    half_life_days: f64,
    saturation: f64,
}

impl DecayParams {
    #[inline]
    pub fn new(half_life_days: f64, saturation: f64) -> Result<Self> {
        if !half_life_days.is_finite() || half_life_days <= 0.0 {
            return Err(RecError::InvalidParameter(format!(
                "half-life must be a positive number of days, got {half_life_days}"
            )));
        }
        if !saturation.is_finite() || saturation <= 0.0 {
            return Err(RecError::InvalidParameter(format!(
                "saturation must be positive, got {saturation}"
            )));
        }
        Ok(Self {
            half_life_days,
            saturation,
        })
    }

    #[inline]
    pub fn half_life_days(&self) -> f64 {
        self.half_life_days
    }

    #[inline]
    pub fn saturation(&self) -> f64 {
        self.saturation
    }
}

/// Time-decayed, saturating interaction scores.
///
/// `raw = Σ strength · 0.5^(age / half_life)` over a user's records for a
/// product, squashed to `raw / (raw + saturation)`. Adding a record never
/// lowers a score.
#[derive(Debug, Clone)]
pub struct DecayedInteractionScores {
    raw: HashMap<String, HashMap<String, f64>>,
    saturation: f64,
    as_of: DateTime<Utc>,
}

impl DecayedInteractionScores {
    #[inline]
    pub fn new(records: &[InteractionRecord], as_of: DateTime<Utc>, params: DecayParams) -> Self {
        let mut raw: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for record in records {
            let weighted = record.strength * record.decay_weight(as_of, params.half_life_days);
            *raw.entry(record.user_id.clone())
                .or_default()
                .entry(record.product_id.clone())
                .or_default() += weighted;
        }

        debug!(
            "Aggregated {} interactions for {} users as of {}",
            records.len(),
            raw.len(),
            as_of
        );

        Self {
            raw,
            saturation: params.saturation,
            as_of,
        }
    }

    #[inline]
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Whether any record for `user_id` was seen
    #[inline]
    pub fn has_history(&self, user_id: &str) -> bool {
        self.raw.contains_key(user_id)
    }

    /// Decayed, unsquashed interaction mass
    #[inline]
    pub fn raw_score(&self, user_id: &str, product_id: &str) -> f64 {
        self.raw
            .get(user_id)
            .and_then(|products| products.get(product_id))
            .copied()
            .unwrap_or(0.0)
    }
}

impl BehavioralSource for DecayedInteractionScores {
    #[inline]
    fn score(&self, user_id: &str, product_id: &str) -> f64 {
        let raw = self.raw_score(user_id, product_id);
        if raw.is_nan() || raw <= 0.0 {
            0.0
        } else {
            // raw / (raw + saturation), defined for infinite raw
            1.0 / (1.0 + self.saturation / raw)
        }
    }
}

/// Precomputed scores, for callers that already have them
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    scores: HashMap<String, HashMap<String, f64>>,
}

impl ScoreTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a score, clamped into `[0, 1]`
    #[inline]
    pub fn insert(&mut self, user_id: &str, product_id: &str, score: f64) {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.scores
            .entry(user_id.to_string())
            .or_default()
            .insert(product_id.to_string(), score);
    }
}

impl BehavioralSource for ScoreTable {
    #[inline]
    fn score(&self, user_id: &str, product_id: &str) -> f64 {
        self.scores
            .get(user_id)
            .and_then(|products| products.get(product_id))
            .copied()
            .unwrap_or(0.0)
    }
}
