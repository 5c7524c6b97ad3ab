
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::behavior::InteractionRecord;
use crate::catalog::Product;

const PRODUCT_COLUMNS: &str =
    "id, title, category, description, tags, price, metadata, embedding, updated_date";

pub struct ProductQueries;

impl ProductQueries {
    /// Replace the stored catalog in one transaction.
    ///
    /// Either every product and the catalog metadata are written, or nothing
    /// changes.
    #[inline]
    pub async fn replace_all(
        pool: &SqlitePool,
        products: &[Product],
        dimension: usize,
        embedding_model: &str,
    ) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM products")
            .execute(&mut *tx)
            .await
            .context("Failed to clear products")?;

        for product in products {
            let row = ProductRow::from_product(product, now)?;
            sqlx::query(
                "INSERT INTO products (id, title, category, description, tags, price, metadata, embedding, updated_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.id)
            .bind(&row.title)
            .bind(&row.category)
            .bind(&row.description)
            .bind(&row.tags)
            .bind(row.price)
            .bind(&row.metadata)
            .bind(&row.embedding)
            .bind(row.updated_date)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert product {}", row.id))?;
        }

        let dimension = i64::try_from(dimension).context("Dimension out of range")?;
        let count = i64::try_from(products.len()).context("Product count out of range")?;
        sqlx::query(
            "INSERT INTO catalog_meta (id, dimension, embedding_model, product_count, ingested_date)
             VALUES (1, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 dimension = excluded.dimension,
                 embedding_model = excluded.embedding_model,
                 product_count = excluded.product_count,
                 ingested_date = excluded.ingested_date",
        )
        .bind(dimension)
        .bind(embedding_model)
        .bind(count)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to update catalog metadata")?;

        tx.commit().await.context("Failed to commit catalog")?;

        debug!("Stored {} products", products.len());
        Ok(products.len())
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ProductRow>> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list products")
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ProductRow>> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get product by id")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await
            .context("Failed to count products")
    }
}

pub struct CatalogMetaQueries;

impl CatalogMetaQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool) -> Result<Option<CatalogMeta>> {
        sqlx::query_as::<_, CatalogMeta>(
            "SELECT dimension, embedding_model, product_count, ingested_date FROM catalog_meta WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
        .context("Failed to read catalog metadata")
    }
}

pub struct InteractionQueries;

impl InteractionQueries {
    /// Append a record and return its row id
    #[inline]
    pub async fn append(pool: &SqlitePool, record: &InteractionRecord) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO interactions (user_id, product_id, strength, kind, created_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.user_id)
        .bind(&record.product_id)
        .bind(record.strength)
        .bind(record.kind.as_str())
        .bind(record.timestamp)
        .execute(pool)
        .await
        .context("Failed to append interaction")?
        .last_insert_rowid();

        Ok(id)
    }

    /// A user's interactions, newest first
    #[inline]
    pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<InteractionRow>> {
        sqlx::query_as::<_, InteractionRow>(
            "SELECT id, user_id, product_id, strength, kind, created_date
             FROM interactions WHERE user_id = ?
             ORDER BY created_date DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list interactions for user")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(pool)
            .await
            .context("Failed to count interactions")
    }

    #[inline]
    pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM interactions")
            .fetch_one(pool)
            .await
            .context("Failed to count users")
    }
}
