use super::*;
use anyhow::Result as AnyResult;
use tempfile::TempDir;

fn product(id: &str, category: &str, embedding: [f32; 3]) -> Product {
    Product {
        id: id.to_string(),
        title: format!("Title {id}"),
        category: category.to_string(),
        description: None,
        tags: Vec::new(),
        price: None,
        metadata: None,
        embedding: embedding.to_vec(),
    }
}

fn catalog() -> Vec<Product> {
    vec![
        product("p1", "Footwear", [1.0, 0.0, 0.0]),
        product("p2", "Footwear", [0.9, 0.1, 0.0]),
        product("p3", "Kitchen", [0.0, 1.0, 0.0]),
        product("p4", "Garden", [0.0, 0.0, 1.0]),
    ]
}

async fn service_with(ranking: RankingConfig) -> AnyResult<(TempDir, RecommendationService)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    let products = catalog();
    database.replace_catalog(&products, 3, "test-embed").await?;

    let snapshot = CatalogSnapshot::build(3, "test-embed", products)?;
    let service = RecommendationService::new(
        database,
        Arc::new(CatalogHandle::new(snapshot)),
        ExplanationAdapter::disabled(),
        ranking,
        MetricsConfig {
            evaluated_k: 10,
            hit_rate_at_k: Some(0.31),
            ndcg_at_k: Some(0.18),
        },
    );
    Ok((temp_dir, service))
}

async fn service() -> AnyResult<(TempDir, RecommendationService)> {
    service_with(RankingConfig::default()).await
}

fn request(user_id: &str, k: i64) -> RecommendationRequest {
    RecommendationRequest {
        k: Some(k),
        skip_explanations: true,
        ..RecommendationRequest::for_user(user_id)
    }
}

#[tokio::test]
async fn recommends_neighbors_of_viewed_products() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p1", 1.0, SignalKind::Implicit)
        .await?;

    let response = service.recommend(&request("u1", 2)).await?;

    let ids: Vec<&str> = response.items.iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(response.items[0].rank, 1);
    assert_eq!(response.items[1].rank, 2);
    assert!(!response.fallback_profile);
    assert!(response.items[0].behavioral_score > 0.0);
    assert_eq!(response.items[1].behavioral_score, 0.0);
    assert_eq!(response.items[0].blurb, "Title p1");
    assert!(response.items[0].explanation.is_none());
    assert!(response.items[0].explanation_source.is_none());
    Ok(())
}

#[tokio::test]
async fn response_carries_model_metadata() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p3", 1.0, SignalKind::Implicit)
        .await?;

    let response = service
        .recommend(&RecommendationRequest {
            alpha: Some(0.5),
            ..request("u1", 1)
        })
        .await?;

    assert_eq!(response.user_id, "u1");
    assert_eq!(response.model.alpha, 0.5);
    assert_eq!(response.model.embedding_model, "test-embed");
    assert_eq!(response.model.catalog_generation, 1);
    assert_eq!(response.model.catalog_size, 4);
    assert_eq!(response.model.evaluated_k, 10);
    assert_eq!(response.model.hit_rate_at_k, Some(0.31));
    assert_eq!(response.model.ndcg_at_k, Some(0.18));
    Ok(())
}

#[tokio::test]
async fn unknown_user_is_rejected_by_default() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    let err = service
        .recommend(&request("nobody", 3))
        .await
        .expect_err("no history");
    assert!(matches!(err, RecError::UnknownUser(ref user) if user == "nobody"));
    Ok(())
}

#[tokio::test]
async fn unknown_user_gets_centroid_when_configured() -> AnyResult<()> {
    let (_temp_dir, service) = service_with(RankingConfig {
        unknown_user_policy: UnknownUserPolicy::CatalogCentroid,
        ..RankingConfig::default()
    })
    .await?;

    let response = service.recommend(&request("nobody", 3)).await?;
    assert!(response.fallback_profile);
    assert_eq!(response.items.len(), 3);
    assert!(response.items.iter().all(|i| i.behavioral_score == 0.0));
    Ok(())
}

#[tokio::test]
async fn parameters_are_checked_before_the_user() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    let bad_alpha = RecommendationRequest {
        alpha: Some(1.5),
        ..request("nobody", 3)
    };
    assert!(matches!(
        service.recommend(&bad_alpha).await,
        Err(RecError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.recommend(&request("nobody", -1)).await,
        Err(RecError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.recommend(&request("  ", 3)).await,
        Err(RecError::InvalidParameter(_))
    ));
    Ok(())
}

#[tokio::test]
async fn zero_k_returns_nothing() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p1", 1.0, SignalKind::Implicit)
        .await?;

    let response = service.recommend(&request("u1", 0)).await?;
    assert!(response.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn explicit_exclusions_and_consumed_products_are_skipped() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p1", 1.0, SignalKind::Explicit)
        .await?;
    service
        .log_interaction("u1", "p2", 1.0, SignalKind::Implicit)
        .await?;

    let kept = service.recommend(&request("u1", 4)).await?;
    assert_eq!(kept.items.len(), 4);

    let response = service
        .recommend(&RecommendationRequest {
            exclude: vec!["p3".to_string()],
            exclude_consumed: Some(true),
            ..request("u1", 4)
        })
        .await?;
    let ids: Vec<&str> = response.items.iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "p4"]);
    Ok(())
}

#[tokio::test]
async fn explanations_fall_back_when_disabled() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p1", 1.0, SignalKind::Implicit)
        .await?;

    let response = service
        .recommend(&RecommendationRequest {
            skip_explanations: false,
            ..request("u1", 2)
        })
        .await?;

    for item in &response.items {
        assert_eq!(item.explanation_source, Some(ExplanationSource::Fallback));
        let explanation = item.explanation.as_deref().unwrap_or_default();
        assert!(explanation.starts_with(&format!("{} is recommended for you.", item.title)));
    }
    assert!(
        response.items[0]
            .explanation
            .as_deref()
            .unwrap_or_default()
            .contains("You previously interacted with this item.")
    );
    Ok(())
}

#[tokio::test]
async fn log_interaction_validates_input() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    assert!(matches!(
        service
            .log_interaction("u1", "missing", 1.0, SignalKind::Implicit)
            .await,
        Err(RecError::ProductNotFound(_))
    ));
    assert!(matches!(
        service
            .log_interaction("u1", "p1", 1e308, SignalKind::Explicit)
            .await,
        Err(RecError::InvalidParameter(_))
    ));
    assert!(matches!(
        service
            .log_interaction("u1", "p1", -1.0, SignalKind::Implicit)
            .await,
        Err(RecError::InvalidParameter(_))
    ));

    let record = service
        .log_interaction(" u1 ", "p1", 2.0, SignalKind::Explicit)
        .await?;
    assert_eq!(record.user_id, "u1");
    assert_eq!(service.database().interaction_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn similar_products_skip_the_seed() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    let similar = service.similar_products("p1", 2)?;
    assert_eq!(similar.len(), 2);
    assert_eq!(similar[0].product_id, "p2");
    assert_eq!(similar[0].title, "Title p2");
    assert!(similar.iter().all(|s| s.product_id != "p1"));

    assert!(matches!(
        service.similar_products("missing", 2),
        Err(RecError::ProductNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn ingest_publishes_new_generation() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    let generation = service
        .ingest(
            vec![product("q1", "Books", [0.5, 0.5, 0.0])],
            3,
            "test-embed",
        )
        .await?;

    assert_eq!(generation, 2);
    assert_eq!(service.catalog().len(), 1);
    assert_eq!(service.database().product_count().await?, 1);
    assert_eq!(service.model_info().catalog_generation, 2);
    Ok(())
}

#[tokio::test]
async fn failed_ingest_changes_nothing() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    let mut broken = product("q1", "Books", [0.5, 0.5, 0.0]);
    broken.embedding.push(1.0);
    let result = service.ingest(vec![broken], 3, "test-embed").await;

    assert!(matches!(
        result,
        Err(RecError::EmbeddingDimensionMismatch { .. })
    ));
    assert_eq!(service.catalog().generation(), 1);
    assert_eq!(service.catalog().len(), 4);
    assert_eq!(service.database().product_count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn reload_rebuilds_from_database() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;

    service
        .database()
        .replace_catalog(&catalog()[..2], 3, "other-embed")
        .await?;
    let generation = service.reload_catalog().await?;

    assert_eq!(generation, 2);
    let snapshot = service.catalog();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.embedding_model(), "other-embed");
    Ok(())
}

#[tokio::test]
async fn status_reports_counts() -> AnyResult<()> {
    let (_temp_dir, service) = service().await?;
    service
        .log_interaction("u1", "p1", 1.0, SignalKind::Implicit)
        .await?;
    service
        .log_interaction("u2", "p2", 1.0, SignalKind::Implicit)
        .await?;

    let status = service.status().await?;
    assert_eq!(status.catalog_generation, 1);
    assert_eq!(status.catalog_size, 4);
    assert_eq!(status.dimension, 3);
    assert_eq!(status.stored_products, 4);
    assert_eq!(status.interactions, 2);
    assert_eq!(status.users, 2);
    assert!(!status.explanations_enabled);
    Ok(())
}

#[tokio::test]
async fn from_config_loads_stored_catalog() -> AnyResult<()> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    database.replace_catalog(&catalog(), 3, "test-embed").await?;
    drop(database);

    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        explainer: crate::config::ExplainerConfig {
            enabled: false,
            ..Default::default()
        },
        ..Config::default()
    };
    let service = RecommendationService::from_config(&config).await?;

    assert_eq!(service.catalog().len(), 4);
    assert_eq!(service.catalog().dimension(), 3);
    assert!(!service.status().await?.explanations_enabled);
    Ok(())
}
