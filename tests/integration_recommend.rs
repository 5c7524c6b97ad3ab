#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end recommendation flow against an on-disk data directory:
// config file, catalog import, interaction log, ranking and reopen.

use anyhow::Result;
use hybrid_rec::RecError;
use hybrid_rec::behavior::SignalKind;
use hybrid_rec::catalog::loader::{MaterializeOptions, materialize, parse_catalog};
use hybrid_rec::config::Config;
use hybrid_rec::explain::ExplanationSource;
use hybrid_rec::service::{RecommendationRequest, RecommendationService};
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

const CATALOG: &str = r#"
{"id": "tent-1", "title": "Ultralight Tent", "category": "Camping", "tags": ["tent", "ultralight"], "price": 249.0, "embedding": [0.9, 0.1, 0.0, 0.0]}
{"product_id": "tent-2", "name": "Family Tent", "category": "Camping", "tags": "tent, family", "embedding": [0.8, 0.2, 0.0, 0.0]}
{"productId": 3, "title": "Camp Stove", "category": "Camping", "description": "Compact gas stove", "embedding": [0.5, 0.5, 0.0, 0.0]}
{"id": "pan-1", "title": "Cast Iron Pan", "category": "Kitchen", "embedding": [0.0, 0.1, 0.9, 0.0]}
{"id": "mug-1", "title": "Ceramic Mug", "category": "Kitchen", "embedding": [0.0, 0.0, 0.6, 0.4]}
"#;

const CONFIG: &str = r#"
[ollama]
model = "test-embed"
embedding_dimension = 4

[explainer]
enabled = false

[ranking]
alpha = 0.3
default_k = 3
unknown_user_policy = "catalog_centroid"

[metrics]
evaluated_k = 5
hit_rate_at_k = 0.42
"#;

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

async fn setup() -> Result<(TempDir, Config, RecommendationService)> {
    init_test_tracing();

    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("config.toml"), CONFIG)?;
    let config = Config::load(temp_dir.path())?;

    let entries = parse_catalog(Cursor::new(CATALOG))?;
    let products = materialize(
        entries,
        None,
        MaterializeOptions {
            dimension: config.ollama.embedding_dimension as usize,
            reembed: false,
            batch_size: 8,
            show_progress: false,
        },
    )?;

    let service = RecommendationService::from_config(&config).await?;
    service
        .ingest(products, 4, &config.ollama.model)
        .await?;

    Ok((temp_dir, config, service))
}

#[tokio::test]
async fn imported_catalog_is_ranked_for_user() -> Result<()> {
    let (_temp_dir, _config, service) = setup().await?;

    service
        .log_interaction("hiker", "tent-1", 1.0, SignalKind::Implicit)
        .await?;
    service
        .log_interaction("hiker", "3", 2.0, SignalKind::Explicit)
        .await?;

    let response = service
        .recommend(&RecommendationRequest::for_user("hiker"))
        .await?;

    assert_eq!(response.items.len(), 3, "default_k from config");
    assert!(!response.fallback_profile);
    assert!(
        response
            .items
            .iter()
            .all(|item| item.product_id != "pan-1" && item.product_id != "mug-1")
    );
    for (position, item) in response.items.iter().enumerate() {
        assert_eq!(item.rank, position + 1);
        assert_eq!(item.explanation_source, Some(ExplanationSource::Fallback));
    }
    for pair in response.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    assert_eq!(response.model.alpha, 0.3);
    assert_eq!(response.model.embedding_model, "test-embed");
    assert_eq!(response.model.evaluated_k, 5);
    assert_eq!(response.model.hit_rate_at_k, Some(0.42));
    assert_eq!(response.model.ndcg_at_k, None);
    Ok(())
}

#[tokio::test]
async fn consumed_products_can_be_excluded() -> Result<()> {
    let (_temp_dir, _config, service) = setup().await?;

    service
        .log_interaction("hiker", "tent-1", 1.0, SignalKind::Explicit)
        .await?;

    let response = service
        .recommend(&RecommendationRequest {
            exclude_consumed: Some(true),
            exclude: vec!["tent-2".to_string()],
            ..RecommendationRequest::for_user("hiker")
        })
        .await?;

    let ids: Vec<&str> = response.items.iter().map(|i| i.product_id.as_str()).collect();
    assert!(!ids.contains(&"tent-1"));
    assert!(!ids.contains(&"tent-2"));
    assert_eq!(ids.first(), Some(&"3"));
    Ok(())
}

#[tokio::test]
async fn new_user_falls_back_to_catalog_centroid() -> Result<()> {
    let (_temp_dir, _config, service) = setup().await?;

    let response = service
        .recommend(&RecommendationRequest::for_user("newcomer"))
        .await?;

    assert!(response.fallback_profile);
    assert_eq!(response.items.len(), 3);
    assert!(response.items.iter().all(|i| i.behavioral_score == 0.0));
    Ok(())
}

#[tokio::test]
async fn data_survives_reopen() -> Result<()> {
    let (_temp_dir, config, service) = setup().await?;
    service
        .log_interaction("cook", "pan-1", 1.0, SignalKind::Implicit)
        .await?;
    drop(service);

    let reopened = RecommendationService::from_config(&config).await?;
    let catalog = reopened.catalog();
    assert_eq!(catalog.len(), 5);
    assert_eq!(catalog.dimension(), 4);
    assert_eq!(catalog.embedding_model(), "test-embed");
    assert_eq!(
        catalog.product("tent-2").map(|p| p.tags.clone()),
        Some(vec!["tent".to_string(), "family".to_string()])
    );

    let response = reopened
        .recommend(&RecommendationRequest {
            k: Some(1),
            skip_explanations: true,
            ..RecommendationRequest::for_user("cook")
        })
        .await?;
    assert_eq!(response.items[0].product_id, "pan-1");
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected() -> Result<()> {
    let (_temp_dir, _config, service) = setup().await?;

    let bad_alpha = service
        .recommend(&RecommendationRequest {
            alpha: Some(-0.1),
            ..RecommendationRequest::for_user("hiker")
        })
        .await;
    assert!(matches!(bad_alpha, Err(RecError::InvalidParameter(_))));

    let unknown_product = service
        .log_interaction("hiker", "kayak-9", 1.0, SignalKind::Implicit)
        .await;
    assert!(matches!(unknown_product, Err(RecError::ProductNotFound(_))));

    let nan_weight = service
        .log_interaction("hiker", "tent-1", f64::NAN, SignalKind::Implicit)
        .await;
    assert!(matches!(nan_weight, Err(RecError::InvalidParameter(_))));
    Ok(())
}

#[tokio::test]
async fn wrong_dimension_import_keeps_previous_catalog() -> Result<()> {
    let (_temp_dir, _config, service) = setup().await?;

    let entries = parse_catalog(Cursor::new(
        r#"{"id": "odd", "title": "Odd", "embedding": [1.0, 0.0]}"#,
    ))?;
    let result = materialize(
        entries,
        None,
        MaterializeOptions {
            dimension: 4,
            reembed: false,
            batch_size: 8,
            show_progress: false,
        },
    );

    assert!(matches!(
        result,
        Err(RecError::EmbeddingDimensionMismatch { .. })
    ));
    assert_eq!(service.catalog().len(), 5);
    assert_eq!(service.database().product_count().await?, 5);
    Ok(())
}
