//! Request orchestration
//!
//! One request loads the current catalog snapshot once, reads the user's
//! history, builds a profile, ranks, and then decorates the ranked list with
//! explanations. Explanations run after ranking and cannot change it.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::behavior::{DecayParams, DecayedInteractionScores, InteractionRecord, SignalKind};
use crate::catalog::{CatalogHandle, CatalogSnapshot, Neighbor, Product};
use crate::config::{Config, MetricsConfig, RankingConfig, UnknownUserPolicy};
use crate::database::Database;
use crate::explain::{
    ExplanationAdapter, ExplanationContext, ExplanationSource, OllamaExplainer, ProductSummary,
    title_blurb,
};
use crate::profile::{ProfileBuilder, UserProfile};
use crate::ranking::{HybridConfig, HybridRanker, ScoredCandidate};
use crate::{RecError, Result};

const RECENT_TITLES: usize = 6;

/// A recommendation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub user_id: String,
    /// Defaults to `ranking.default_k`
    pub k: Option<i64>,
    /// Defaults to `ranking.alpha`
    pub alpha: Option<f64>,
    pub exclude: Vec<String>,
    /// Overrides `ranking.exclude_consumed`
    pub exclude_consumed: Option<bool>,
    pub skip_explanations: bool,
}

impl RecommendationRequest {
    #[inline]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub product_id: String,
    pub title: String,
    pub rank: usize,
    pub score: f64,
    pub content_similarity: f64,
    pub behavioral_score: f64,
    pub blurb: String,
    pub explanation: Option<String>,
    pub explanation_source: Option<ExplanationSource>,
    pub generated_at: DateTime<Utc>,
}

/// Provenance of the model that produced a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub alpha: f64,
    pub embedding_model: String,
    pub catalog_generation: u64,
    pub catalog_size: usize,
    pub evaluated_k: u32,
    pub hit_rate_at_k: Option<f64>,
    pub ndcg_at_k: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub request_id: Uuid,
    pub user_id: String,
    /// Set when the user had no history and the centroid profile was used
    pub fallback_profile: bool,
    pub items: Vec<RecommendationItem>,
    pub model: ModelMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarProduct {
    pub product_id: String,
    pub title: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub catalog_generation: u64,
    pub catalog_size: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub stored_products: i64,
    pub interactions: i64,
    pub users: i64,
    pub explanations_enabled: bool,
}

/// Shared entry point for the CLI and the tool server
pub struct RecommendationService {
    database: Database,
    catalog: Arc<CatalogHandle>,
    explanations: ExplanationAdapter,
    ranking: RankingConfig,
    metrics: MetricsConfig,
}

impl RecommendationService {
    #[inline]
    pub fn new(
        database: Database,
        catalog: Arc<CatalogHandle>,
        explanations: ExplanationAdapter,
        ranking: RankingConfig,
        metrics: MetricsConfig,
    ) -> Self {
        Self {
            database,
            catalog,
            explanations,
            ranking,
            metrics,
        }
    }

    /// Open the database in the configured data directory and load the
    /// stored catalog
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(database_error)?;

        let snapshot = load_snapshot(&database, config).await?;
        info!(
            "Loaded catalog with {} products (dimension {})",
            snapshot.len(),
            snapshot.dimension()
        );

        let explanations = if config.explainer.enabled {
            let explainer = OllamaExplainer::new(&config.explainer)?;
            ExplanationAdapter::new(
                Arc::new(explainer),
                config.explainer.timeout(),
                config.explainer.cache_ttl(),
            )
        } else {
            ExplanationAdapter::disabled()
        };

        Ok(Self::new(
            database,
            Arc::new(CatalogHandle::new(snapshot)),
            explanations,
            config.ranking.clone(),
            config.metrics.clone(),
        ))
    }

    #[inline]
    pub fn catalog(&self) -> Arc<CatalogSnapshot> {
        self.catalog.load()
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Rank and explain products for one user
    #[inline]
    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        let request_id = Uuid::new_v4();
        let alpha = HybridConfig::new(request.alpha.unwrap_or(self.ranking.alpha))?.alpha();
        let k = request.k.unwrap_or_else(|| i64::from(self.ranking.default_k));
        if k < 0 {
            return Err(RecError::InvalidParameter(format!(
                "k must not be negative, got {k}"
            )));
        }

        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(RecError::InvalidParameter(
                "user id must not be empty".to_string(),
            ));
        }

        debug!("Request {} for user {} (k {}, alpha {})", request_id, user_id, k, alpha);

        let snapshot = self.catalog.load();
        let history = self
            .database
            .interactions_for_user(user_id)
            .await
            .map_err(database_error)?;

        let as_of = Utc::now();
        let builder = ProfileBuilder::new(&snapshot, as_of, self.ranking.half_life_days);
        let (profile, fallback_profile) = self.resolve_profile(&builder, user_id, &history)?;

        let behavior = DecayedInteractionScores::new(
            &history,
            as_of,
            DecayParams::new(self.ranking.half_life_days, self.ranking.saturation)?,
        );

        let mut exclusions: HashSet<String> = request
            .exclude
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if request
            .exclude_consumed
            .unwrap_or(self.ranking.exclude_consumed)
        {
            exclusions.extend(
                history
                    .iter()
                    .filter(|record| record.kind == SignalKind::Explicit)
                    .map(|record| record.product_id.clone()),
            );
        }

        let ranked = HybridRanker::new(&snapshot, &profile, &behavior).rank(
            user_id,
            k,
            alpha,
            &exclusions,
        )?;

        let items = self
            .decorate(&snapshot, &profile, ranked, request.skip_explanations)
            .await;

        info!(
            "Request {} served {} items to user {}",
            request_id,
            items.len(),
            user_id
        );

        Ok(RecommendationResponse {
            request_id,
            user_id: user_id.to_string(),
            fallback_profile,
            items,
            model: self.metadata_for(&snapshot, alpha),
        })
    }

    fn resolve_profile(
        &self,
        builder: &ProfileBuilder<'_>,
        user_id: &str,
        history: &[InteractionRecord],
    ) -> Result<(UserProfile, bool)> {
        if let Some(profile) = builder.build(user_id, history) {
            return Ok((profile, false));
        }

        match self.ranking.unknown_user_policy {
            UnknownUserPolicy::Reject => Err(RecError::UnknownUser(user_id.to_string())),
            UnknownUserPolicy::CatalogCentroid => {
                debug!("Using catalog centroid for user {}", user_id);
                builder
                    .centroid(user_id)
                    .map(|profile| (profile, true))
                    .ok_or_else(|| RecError::UnknownUser(user_id.to_string()))
            }
        }
    }

    async fn decorate(
        &self,
        snapshot: &CatalogSnapshot,
        profile: &UserProfile,
        ranked: Vec<ScoredCandidate>,
        skip_explanations: bool,
    ) -> Vec<RecommendationItem> {
        let generated_at = Utc::now();

        let recent_titles: Vec<String> = profile
            .recent_product_ids(RECENT_TITLES)
            .into_iter()
            .filter_map(|id| snapshot.product(id))
            .map(|product| product.title.clone())
            .collect();

        let mut contexts = Vec::with_capacity(ranked.len());
        let mut titles = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            let Some(product) = snapshot.product(&candidate.product_id) else {
                warn!("Ranked product {} missing from snapshot", candidate.product_id);
                continue;
            };
            titles.push((product.title.clone(), title_blurb(product)));
            contexts.push(explanation_context(
                profile,
                candidate,
                product,
                recent_titles.clone(),
            ));
        }

        let explanations = if skip_explanations {
            Vec::new()
        } else {
            self.explanations.explain_all(&contexts).await
        };
        let mut explanations = explanations.into_iter();

        contexts
            .into_iter()
            .zip(titles)
            .map(|(context, (title, default_blurb))| {
                let (blurb, explanation, source) = match explanations.next() {
                    Some(e) => (e.blurb, Some(e.explanation), Some(e.source)),
                    None => (default_blurb, None, None),
                };
                let candidate = context.candidate;
                RecommendationItem {
                    product_id: candidate.product_id,
                    title,
                    rank: candidate.rank,
                    score: candidate.combined_score,
                    content_similarity: candidate.content_similarity,
                    behavioral_score: candidate.behavioral_score,
                    blurb,
                    explanation,
                    explanation_source: source,
                    generated_at,
                }
            })
            .collect()
    }

    /// Validate and append one interaction
    #[inline]
    pub async fn log_interaction(
        &self,
        user_id: &str,
        product_id: &str,
        strength: f64,
        kind: SignalKind,
    ) -> Result<InteractionRecord> {
        let record = InteractionRecord::new(user_id, product_id, strength, kind, Utc::now())?;

        if !self.catalog.load().contains(&record.product_id) {
            return Err(RecError::ProductNotFound(record.product_id));
        }

        let id = self
            .database
            .append_interaction(&record)
            .await
            .map_err(database_error)?;
        debug!(
            "Logged interaction {} ({} -> {}, {})",
            id, record.user_id, record.product_id, record.kind
        );
        Ok(record)
    }

    /// Products closest to `product_id`, excluding itself
    #[inline]
    pub fn similar_products(&self, product_id: &str, limit: usize) -> Result<Vec<SimilarProduct>> {
        let snapshot = self.catalog.load();
        let query = snapshot.lookup(product_id)?;
        let neighbors = snapshot.nearest(query, limit, Some(product_id))?;

        Ok(neighbors
            .into_iter()
            .map(|Neighbor { product_id, similarity }| SimilarProduct {
                title: snapshot
                    .product(&product_id)
                    .map(|p| p.title.clone())
                    .unwrap_or_default(),
                product_id,
                similarity,
            })
            .collect())
    }

    #[inline]
    pub fn model_info(&self) -> ModelMetadata {
        self.metadata_for(&self.catalog.load(), self.ranking.alpha)
    }

    fn metadata_for(&self, snapshot: &CatalogSnapshot, alpha: f64) -> ModelMetadata {
        ModelMetadata {
            alpha,
            embedding_model: snapshot.embedding_model().to_string(),
            catalog_generation: snapshot.generation(),
            catalog_size: snapshot.len(),
            evaluated_k: self.metrics.evaluated_k,
            hit_rate_at_k: self.metrics.hit_rate_at_k,
            ndcg_at_k: self.metrics.ndcg_at_k,
        }
    }

    /// Store a new catalog and publish it.
    ///
    /// The snapshot is validated before anything is written, so a bad
    /// catalog leaves both the database and the served snapshot untouched.
    #[inline]
    pub async fn ingest(
        &self,
        products: Vec<Product>,
        dimension: usize,
        embedding_model: &str,
    ) -> Result<u64> {
        let snapshot = CatalogSnapshot::build(dimension, embedding_model, products)?;

        self.database
            .replace_catalog(snapshot.products(), dimension, embedding_model)
            .await
            .map_err(database_error)?;

        if let Err(e) = self.database.optimize().await {
            warn!("Database optimization after ingest failed: {:#}", e);
        }

        self.explanations.cache().clear();
        Ok(self.catalog.swap(snapshot))
    }

    /// Rebuild the snapshot from the database and publish it
    #[inline]
    pub async fn reload_catalog(&self) -> Result<u64> {
        let current = self.catalog.load();
        let products = self.database.load_products().await.map_err(database_error)?;
        let (dimension, model) = match self.database.catalog_meta().await.map_err(database_error)? {
            Some(meta) => (
                usize::try_from(meta.dimension).map_err(|_| {
                    RecError::Database(format!("stored dimension {} is invalid", meta.dimension))
                })?,
                meta.embedding_model,
            ),
            None => (current.dimension(), current.embedding_model().to_string()),
        };

        let snapshot = CatalogSnapshot::build(dimension, model, products)?;
        self.explanations.cache().clear();
        Ok(self.catalog.swap(snapshot))
    }

    #[inline]
    pub async fn status(&self) -> Result<StatusReport> {
        let snapshot = self.catalog.load();
        Ok(StatusReport {
            catalog_generation: snapshot.generation(),
            catalog_size: snapshot.len(),
            dimension: snapshot.dimension(),
            embedding_model: snapshot.embedding_model().to_string(),
            stored_products: self.database.product_count().await.map_err(database_error)?,
            interactions: self
                .database
                .interaction_count()
                .await
                .map_err(database_error)?,
            users: self.database.user_count().await.map_err(database_error)?,
            explanations_enabled: self.explanations.is_enabled(),
        })
    }
}

fn explanation_context(
    profile: &UserProfile,
    candidate: ScoredCandidate,
    product: &Product,
    recent_titles: Vec<String>,
) -> ExplanationContext {
    ExplanationContext {
        user_id: profile.user_id.clone(),
        behavioral_signal: candidate.behavioral_score > 0.0,
        interacted: profile.has_interacted(&product.id),
        interest_terms: profile.interest_terms.clone(),
        recent_titles,
        product: ProductSummary::from(product),
        candidate,
    }
}

async fn load_snapshot(database: &Database, config: &Config) -> Result<CatalogSnapshot> {
    let products = database.load_products().await.map_err(database_error)?;
    let meta = database.catalog_meta().await.map_err(database_error)?;

    let (dimension, model) = match meta {
        Some(meta) => (
            usize::try_from(meta.dimension).map_err(|_| {
                RecError::Database(format!("stored dimension {} is invalid", meta.dimension))
            })?,
            meta.embedding_model,
        ),
        None => (
            config.ollama.embedding_dimension as usize,
            config.ollama.model.clone(),
        ),
    };

    CatalogSnapshot::build(dimension, model, products)
}

fn database_error(error: anyhow::Error) -> RecError {
    RecError::Database(format!("{error:#}"))
}
