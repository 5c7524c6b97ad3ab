//! Natural-language explanations for ranked products
//!
//! Explanation text comes from an external [`Explainer`] that may fail or
//! answer slowly. [`ExplanationAdapter`] bounds every call with a timeout and
//! falls back to deterministic text, so a response always carries an
//! explanation. The ranking it decorates is never touched.


pub mod ollama;
pub mod sanitize;

pub use ollama::OllamaExplainer;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::Product;
use crate::ranking::ScoredCandidate;
use crate::{RecError, Result};

use self::sanitize::{MAX_TITLE_CHARS, is_consistent_with_history, sanitize, truncate_chars};

const FALLBACK_BLURB_CHARS: usize = 120;
const NO_HISTORY: &str = "No strong history available.";

/// Where an explanation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSource {
    Llm,
    Cache,
    Fallback,
}

impl ExplanationSource {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        }
    }
}

/// Product fields an explainer may talk about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Product> for ProductSummary {
    #[inline]
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            title: product.title.clone(),
            category: product.category.clone(),
            tags: product.tags.clone(),
            price: product.price,
            description: product.description.clone(),
        }
    }
}

/// Everything known about why one product was ranked for one user
#[derive(Debug, Clone)]
pub struct ExplanationContext {
    pub user_id: String,
    pub candidate: ScoredCandidate,
    pub product: ProductSummary,
    /// Whether the behavioral score was non-zero
    pub behavioral_signal: bool,
    /// Whether the user interacted with this very product
    pub interacted: bool,
    pub interest_terms: Vec<String>,
    /// Titles of recently interacted products, newest first
    pub recent_titles: Vec<String>,
}

impl ExplanationContext {
    #[inline]
    pub fn has_history(&self) -> bool {
        self.interacted || !self.recent_titles.is_empty()
    }

    /// Short description of the user's history for prompts
    #[inline]
    pub fn history_summary(&self) -> String {
        if !self.has_history() {
            return NO_HISTORY.to_string();
        }

        let mut parts = Vec::new();
        if !self.recent_titles.is_empty() {
            parts.push(format!(
                "Recently interacted products: {}",
                self.recent_titles.join("; ")
            ));
        }
        if !self.interest_terms.is_empty() {
            parts.push(format!(
                "Recent categories: {}",
                self.interest_terms.join("; ")
            ));
        }
        if self.interacted {
            parts.push("The user has interacted with this product before.".to_string());
        }
        parts.join("\n")
    }
}

/// Raw text returned by an [`Explainer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub blurb: String,
    pub explanation: String,
}

/// Final explanation attached to a response item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub blurb: String,
    pub explanation: String,
    pub source: ExplanationSource,
}

/// External text generator
#[async_trait]
pub trait Explainer: Send + Sync {
    fn name(&self) -> &str;

    /// Generate text for one product. `strict` asks for an explanation that
    /// opens with the user's own behavior.
    async fn generate(&self, context: &ExplanationContext, strict: bool) -> Result<GeneratedText>;
}

/// Deterministic explanation used whenever generation is unavailable
#[inline]
pub fn fallback_explanation(context: &ExplanationContext) -> Explanation {
    let product = &context.product;
    let title = if product.title.trim().is_empty() {
        product
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("This product")
    } else {
        product.title.trim()
    };

    let mut reasons = Vec::new();
    if context.interacted {
        reasons.push("You previously interacted with this item.".to_string());
    } else if !product.category.trim().is_empty()
        && context
            .interest_terms
            .iter()
            .any(|term| term.eq_ignore_ascii_case(product.category.trim()))
    {
        reasons.push(format!(
            "Based on your interest in {} items.",
            product.category.trim()
        ));
    }
    if let Some(tag) = product.tags.iter().map(|t| t.trim()).find(|t| !t.is_empty()) {
        reasons.push(format!("It includes {tag}."));
    }
    if reasons.is_empty() {
        reasons.push(if context.has_history() {
            "It matches your recent browsing patterns.".to_string()
        } else {
            "It closely matches your profile.".to_string()
        });
    }

    let mut sentences = vec![format!("{title} is recommended for you.")];
    sentences.extend(reasons);
    if let Some(price) = product.price.filter(|p| p.is_finite() && *p > 0.0) {
        sentences.push(format!("Priced at {price:.2}."));
    }
    sentences.truncate(sanitize::MAX_SENTENCES);

    let blurb_source = product
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(title);

    Explanation {
        blurb: truncate_chars(blurb_source, FALLBACK_BLURB_CHARS),
        explanation: sentences.join(" "),
        source: ExplanationSource::Fallback,
    }
}

/// Time-bounded cache of generated explanations keyed by (user, product)
#[derive(Debug)]
pub struct ExplanationCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), (Instant, GeneratedText)>>,
}

impl ExplanationCache {
    /// A zero `ttl` disables caching
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn get(&self, user_id: &str, product_id: &str) -> Option<GeneratedText> {
        if self.ttl.is_zero() {
            return None;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (user_id.to_string(), product_id.to_string());
        match entries.get(&key) {
            Some((stored_at, text)) if stored_at.elapsed() < self.ttl => Some(text.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    #[inline]
    pub fn insert(&self, user_id: &str, product_id: &str, text: GeneratedText) {
        if self.ttl.is_zero() {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(
            (user_id.to_string(), product_id.to_string()),
            (Instant::now(), text),
        );
    }

    #[inline]
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Boundary between ranking output and an [`Explainer`]
pub struct ExplanationAdapter {
    explainer: Option<Arc<dyn Explainer>>,
    timeout: Duration,
    cache: ExplanationCache,
}

impl ExplanationAdapter {
    #[inline]
    pub fn new(explainer: Arc<dyn Explainer>, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            explainer: Some(explainer),
            timeout,
            cache: ExplanationCache::new(cache_ttl),
        }
    }

    /// Adapter that always answers with the deterministic fallback
    #[inline]
    pub fn disabled() -> Self {
        Self {
            explainer: None,
            timeout: Duration::ZERO,
            cache: ExplanationCache::new(Duration::ZERO),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.explainer.is_some()
    }

    #[inline]
    pub fn cache(&self) -> &ExplanationCache {
        &self.cache
    }

    /// Explain every context concurrently. Output order matches input order.
    #[inline]
    pub async fn explain_all(&self, contexts: &[ExplanationContext]) -> Vec<Explanation> {
        join_all(contexts.iter().map(|context| self.explain(context))).await
    }

    /// Explain one ranked product. Never fails.
    #[inline]
    pub async fn explain(&self, context: &ExplanationContext) -> Explanation {
        let Some(explainer) = &self.explainer else {
            return fallback_explanation(context);
        };

        let product_id = &context.candidate.product_id;
        if let Some(cached) = self.cache.get(&context.user_id, product_id) {
            debug!("Explanation cache hit for {}/{}", context.user_id, product_id);
            return Explanation {
                blurb: cached.blurb,
                explanation: cached.explanation,
                source: ExplanationSource::Cache,
            };
        }

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.attempt(explainer.as_ref(), context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RecError::ExplanationUnavailable(format!(
                "{} timed out after {:?}",
                explainer.name(),
                self.timeout
            ))),
        };

        match outcome {
            Ok(text) => {
                self.cache
                    .insert(&context.user_id, product_id, text.clone());
                Explanation {
                    blurb: text.blurb,
                    explanation: text.explanation,
                    source: ExplanationSource::Llm,
                }
            }
            Err(e) => {
                warn!("Using fallback explanation for {}: {}", product_id, e);
                fallback_explanation(context)
            }
        }
    }

    async fn attempt(
        &self,
        explainer: &dyn Explainer,
        context: &ExplanationContext,
    ) -> Result<GeneratedText> {
        let title = &context.product.title;

        let first = explainer.generate(context, false).await?;
        if let Some(text) = accept(context, &first, title) {
            return Ok(text);
        }

        info!(
            "Explanation for {} inconsistent with history, retrying",
            context.candidate.product_id
        );
        let retry = explainer.generate(context, true).await?;
        accept(context, &retry, title).ok_or_else(|| {
            RecError::ExplanationUnavailable(format!(
                "no consistent explanation for {}",
                context.candidate.product_id
            ))
        })
    }
}

fn accept(
    context: &ExplanationContext,
    text: &GeneratedText,
    title: &str,
) -> Option<GeneratedText> {
    let (blurb, explanation) = sanitize(&text.blurb, &text.explanation, title)?;
    if !is_consistent_with_history(context.has_history(), &explanation) {
        return None;
    }
    Some(GeneratedText { blurb, explanation })
}

/// Blurb for a product shown without a generated explanation
#[inline]
pub fn title_blurb(product: &Product) -> String {
    truncate_chars(&product.title, MAX_TITLE_CHARS)
}
