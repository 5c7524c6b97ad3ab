#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use super::sanitize::{extract_json_object, truncate_chars};
use super::{ExplanationContext, Explainer, GeneratedText};
use crate::config::ExplainerConfig;
use crate::embeddings::OllamaClient;
use crate::{RecError, Result};

const MAX_PROMPT_TITLE_CHARS: usize = 120;
const MAX_PROMPT_DESCRIPTION_CHARS: usize = 300;
const STRICT_TEMPERATURE: f32 = 0.2;

const PROMPT: &str = r#"You are a product analyst writing a short note on why one product is recommended to a shopper.

Reply with ONE JSON object and nothing else:
{"product_id": string, "blurb": string, "explanation": string}

- "blurb": a product summary of at most 20 words.
- "explanation": 2 to 4 short sentences. The first sentence says why this product fits the shopper. Mention their history only if the shopper context below lists it.
- Use only the product fields given. Never invent features, ratings or prices.
- Do not say the shopper has no activity.

Shopper context:
{history}

Product:
{product}
"#;

const STRICT_PROMPT: &str = r#"Explain why product {product_id} is recommended to this shopper based on what they did.

Reply with ONE JSON object and nothing else:
{"product_id": string, "blurb": string, "explanation": string}

- "blurb": at most 20 words.
- "explanation": 1 to 4 short sentences. The FIRST sentence must start from the shopper's behavior, for example "You recently viewed ...".
- Use only the product fields given.

Shopper context:
{history}

Product:
{product}
"#;

/// [`Explainer`] backed by an Ollama `/api/generate` model
#[derive(Debug, Clone)]
pub struct OllamaExplainer {
    client: Arc<OllamaClient>,
    temperature: f32,
}

impl OllamaExplainer {
    /// The client gets the configured timeout and a single attempt; the
    /// adapter's own timeout bounds the whole exchange.
    #[inline]
    pub fn new(config: &ExplainerConfig) -> Result<Self> {
        let base_url = config
            .explainer_url()
            .map_err(|e| RecError::Config(e.to_string()))?;

        let client = OllamaClient::with_base_url(base_url, config.model.clone(), 1)
            .with_timeout(config.timeout())
            .with_retry_attempts(1);

        Ok(Self {
            client: Arc::new(client),
            temperature: config.temperature,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Prompt for one product
    #[inline]
    pub fn build_prompt(context: &ExplanationContext, strict: bool) -> String {
        let template = if strict { STRICT_PROMPT } else { PROMPT };
        template
            .replace("{product_id}", &context.product.product_id)
            .replace("{history}", &context.history_summary())
            .replace("{product}", &product_json(context).to_string())
    }
}

fn product_json(context: &ExplanationContext) -> Value {
    let product = &context.product;
    json!({
        "product_id": product.product_id,
        "title": truncate_chars(&product.title, MAX_PROMPT_TITLE_CHARS),
        "category": product.category,
        "tags": product.tags,
        "price": product.price,
        "description": product
            .description
            .as_deref()
            .map(|d| truncate_chars(d, MAX_PROMPT_DESCRIPTION_CHARS)),
    })
}

/// Pull `blurb` and `explanation` out of a model reply
#[inline]
pub fn parse_reply(reply: &str) -> Result<GeneratedText> {
    let value = extract_json_object(reply).ok_or_else(|| {
        RecError::ExplanationUnavailable("reply contained no JSON object".to_string())
    })?;

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let explanation = field("explanation");
    if explanation.is_empty() {
        return Err(RecError::ExplanationUnavailable(
            "reply had an empty explanation".to_string(),
        ));
    }

    Ok(GeneratedText {
        blurb: field("blurb"),
        explanation,
    })
}

#[async_trait]
impl Explainer for OllamaExplainer {
    #[inline]
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, context: &ExplanationContext, strict: bool) -> Result<GeneratedText> {
        let prompt = Self::build_prompt(context, strict);
        let temperature = if strict {
            STRICT_TEMPERATURE.min(self.temperature)
        } else {
            self.temperature
        };
        let client = Arc::clone(&self.client);

        debug!(
            "Requesting explanation for {} (strict: {})",
            context.product.product_id, strict
        );

        let reply = tokio::task::spawn_blocking(move || client.generate(&prompt, temperature, true))
            .await
            .map_err(|e| RecError::ExplanationUnavailable(format!("explainer task failed: {e}")))?
            .map_err(|e| RecError::ExplanationUnavailable(format!("{e:#}")))?;

        parse_reply(&reply)
    }
}
