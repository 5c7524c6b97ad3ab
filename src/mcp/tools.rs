//! MCP Tools Implementation
//!
//! Each tool decodes its arguments, calls the [`RecommendationService`] and
//! returns pretty-printed JSON. Malformed arguments are a protocol error;
//! recommender failures come back as tool results flagged `isError`.

use crate::behavior::{MAX_INTERACTION_STRENGTH, SignalKind};
use crate::mcp::errors::{McpError, tool_error_result};
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::service::{RecommendationRequest, RecommendationService};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_SIMILAR_LIMIT: usize = 10;

fn decode_arguments<T: DeserializeOwned>(tool: &str, params: &CallToolParams) -> Result<T> {
    serde_json::from_value(params.arguments_value()).map_err(|e| {
        McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecommendArgs {
    user_id: String,
    k: Option<i64>,
    alpha: Option<f64>,
    #[serde(default)]
    exclude: Vec<String>,
    exclude_consumed: Option<bool>,
    #[serde(default = "default_true")]
    explain: bool,
}

/// `recommend`: ranked products with explanations for one user
pub struct RecommendHandler {
    service: Arc<RecommendationService>,
}

impl RecommendHandler {
    pub const NAME: &'static str = "recommend";

    #[inline]
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some(
                "Recommend products for a user, blending content similarity with behavior"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "User to recommend for"
                    },
                    "k": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Number of products to return (default from config)"
                    },
                    "alpha": {
                        "type": "number",
                        "minimum": 0,
                        "maximum": 1,
                        "description": "Weight of behavioral signal versus content similarity"
                    },
                    "exclude": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Product ids that must not be returned"
                    },
                    "exclude_consumed": {
                        "type": "boolean",
                        "description": "Skip products the user explicitly consumed"
                    },
                    "explain": {
                        "type": "boolean",
                        "description": "Generate explanations (default: true)"
                    }
                },
                "required": ["user_id"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RecommendHandler {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: RecommendArgs = decode_arguments(Self::NAME, &params)?;
        debug!("recommend: user={} k={:?} alpha={:?}", args.user_id, args.k, args.alpha);

        let request = RecommendationRequest {
            user_id: args.user_id,
            k: args.k,
            alpha: args.alpha,
            exclude: args.exclude,
            exclude_consumed: args.exclude_consumed,
            skip_explanations: !args.explain,
        };

        match self.service.recommend(&request).await {
            Ok(response) => Ok(CallToolResult::json(&response)?),
            Err(e) => Ok(tool_error_result(Self::NAME, &e)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogInteractionArgs {
    user_id: String,
    product_id: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    kind: SignalKind,
}

fn default_weight() -> f64 {
    1.0
}

/// `log_interaction`: append one behavioral signal
pub struct LogInteractionHandler {
    service: Arc<RecommendationService>,
}

impl LogInteractionHandler {
    pub const NAME: &'static str = "log_interaction";

    #[inline]
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Record that a user interacted with a product".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": { "type": "string", "description": "User id" },
                    "product_id": { "type": "string", "description": "Product id" },
                    "weight": {
                        "type": "number",
                        "minimum": 0,
                        "maximum": MAX_INTERACTION_STRENGTH,
                        "description": "Signal strength (default: 1.0)"
                    },
                    "kind": {
                        "type": "string",
                        "enum": ["implicit", "explicit"],
                        "description": "implicit (view, click) or explicit (purchase, rating)"
                    }
                },
                "required": ["user_id", "product_id"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for LogInteractionHandler {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: LogInteractionArgs = decode_arguments(Self::NAME, &params)?;

        match self
            .service
            .log_interaction(&args.user_id, &args.product_id, args.weight, args.kind)
            .await
        {
            Ok(record) => Ok(CallToolResult::json(&json!({
                "logged": true,
                "interaction": record,
            }))?),
            Err(e) => Ok(tool_error_result(Self::NAME, &e)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimilarProductsArgs {
    product_id: String,
    limit: Option<usize>,
}

/// `similar_products`: nearest catalog neighbors of one product
pub struct SimilarProductsHandler {
    service: Arc<RecommendationService>,
}

impl SimilarProductsHandler {
    pub const NAME: &'static str = "similar_products";

    #[inline]
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Find products most similar to a given product".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "product_id": { "type": "string", "description": "Seed product id" },
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum number of results (default: 10)"
                    }
                },
                "required": ["product_id"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SimilarProductsHandler {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: SimilarProductsArgs = decode_arguments(Self::NAME, &params)?;
        let limit = args.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);

        match self.service.similar_products(&args.product_id, limit) {
            Ok(similar) => Ok(CallToolResult::json(&json!({
                "product_id": args.product_id,
                "results": similar,
            }))?),
            Err(e) => Ok(tool_error_result(Self::NAME, &e)),
        }
    }
}

/// `model_info`: blend weight, embedding model and offline metrics
pub struct ModelInfoHandler {
    service: Arc<RecommendationService>,
}

impl ModelInfoHandler {
    pub const NAME: &'static str = "model_info";

    #[inline]
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some(
                "Describe the active model: alpha, embedding model, catalog and metrics"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ModelInfoHandler {
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        Ok(CallToolResult::json(&self.service.model_info())?)
    }
}

/// `reload_catalog`: rebuild the served snapshot from the database
pub struct ReloadCatalogHandler {
    service: Arc<RecommendationService>,
}

impl ReloadCatalogHandler {
    pub const NAME: &'static str = "reload_catalog";

    #[inline]
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Reload the product catalog from storage".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ReloadCatalogHandler {
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        match self.service.reload_catalog().await {
            Ok(generation) => Ok(CallToolResult::json(&json!({
                "catalog_generation": generation,
                "catalog_size": self.service.catalog().len(),
            }))?),
            Err(e) => Ok(tool_error_result(Self::NAME, &e)),
        }
    }
}

/// Build a server with every recommender tool registered
#[inline]
pub async fn create_server(service: Arc<RecommendationService>) -> McpServer {
    let server = McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    server
        .register_tool(
            RecommendHandler::tool_definition(),
            RecommendHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            LogInteractionHandler::tool_definition(),
            LogInteractionHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            SimilarProductsHandler::tool_definition(),
            SimilarProductsHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            ModelInfoHandler::tool_definition(),
            ModelInfoHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            ReloadCatalogHandler::tool_definition(),
            ReloadCatalogHandler::new(service),
        )
        .await;

    server
}
