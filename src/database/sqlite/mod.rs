use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::behavior::InteractionRecord;
use crate::catalog::Product;
use crate::database::sqlite::models::CatalogMeta;
use crate::database::sqlite::queries::{CatalogMetaQueries, InteractionQueries, ProductQueries};

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

const DATABASE_FILE: &str = "recommender.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join(DATABASE_FILE)).await
    }

    // Catalog operations
    #[inline]
    pub async fn replace_catalog(
        &self,
        products: &[Product],
        dimension: usize,
        embedding_model: &str,
    ) -> Result<usize> {
        ProductQueries::replace_all(&self.pool, products, dimension, embedding_model).await
    }

    /// Every stored product, ordered by id
    #[inline]
    pub async fn load_products(&self) -> Result<Vec<Product>> {
        ProductQueries::list_all(&self.pool)
            .await?
            .into_iter()
            .map(models::ProductRow::into_product)
            .collect()
    }

    #[inline]
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        ProductQueries::get_by_id(&self.pool, id)
            .await?
            .map(models::ProductRow::into_product)
            .transpose()
    }

    #[inline]
    pub async fn product_count(&self) -> Result<i64> {
        ProductQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn catalog_meta(&self) -> Result<Option<CatalogMeta>> {
        CatalogMetaQueries::get(&self.pool).await
    }

    // Interaction log operations
    #[inline]
    pub async fn append_interaction(&self, record: &InteractionRecord) -> Result<i64> {
        InteractionQueries::append(&self.pool, record).await
    }

    /// A user's interactions, newest first
    #[inline]
    pub async fn interactions_for_user(&self, user_id: &str) -> Result<Vec<InteractionRecord>> {
        InteractionQueries::list_for_user(&self.pool, user_id)
            .await?
            .into_iter()
            .map(models::InteractionRow::into_record)
            .collect()
    }

    #[inline]
    pub async fn interaction_count(&self) -> Result<i64> {
        InteractionQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn user_count(&self) -> Result<i64> {
        InteractionQueries::count_users(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
