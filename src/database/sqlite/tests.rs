use super::*;
use crate::behavior::SignalKind;
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
    )
    .fetch_all(database.pool())
    .await?;

    let expected_tables: HashSet<&'static str> = ["products", "catalog_meta", "interactions"]
        .into_iter()
        .collect();

    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn database_file_lives_in_data_dir() -> Result<()> {
    let (temp_dir, _database) = create_test_database().await?;
    assert!(temp_dir.path().join("recommender.db").exists());
    Ok(())
}

#[tokio::test]
async fn catalog_round_trip() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let product = Product {
        id: "sku-1".to_string(),
        title: "Kettle".to_string(),
        category: "Kitchen".to_string(),
        description: Some("Stainless kettle".to_string()),
        tags: vec!["steel".to_string()],
        price: Some(39.0),
        metadata: None,
        embedding: vec![0.1, 0.2, 0.3],
    };

    assert_eq!(
        database
            .replace_catalog(std::slice::from_ref(&product), 3, "embed-model")
            .await?,
        1
    );
    assert_eq!(database.load_products().await?, vec![product.clone()]);
    assert_eq!(database.get_product("sku-1").await?, Some(product));
    assert_eq!(database.get_product("missing").await?, None);
    assert_eq!(database.product_count().await?, 1);

    let meta = database.catalog_meta().await?.expect("meta stored");
    assert_eq!(meta.dimension, 3);
    Ok(())
}

#[tokio::test]
async fn interaction_round_trip() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let record = InteractionRecord::new("u1", "sku-1", 2.5, SignalKind::Explicit, Utc::now())?;
    database.append_interaction(&record).await?;

    let stored = database.interactions_for_user("u1").await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].product_id, "sku-1");
    assert_eq!(stored[0].kind, SignalKind::Explicit);
    assert_eq!(stored[0].strength, 2.5);
    assert!(database.interactions_for_user("u2").await?.is_empty());
    assert_eq!(database.interaction_count().await?, 1);
    assert_eq!(database.user_count().await?, 1);

    database.optimize().await?;
    Ok(())
}
