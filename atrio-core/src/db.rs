use crate::config::DatabaseConfig;
use crate::error::AtrioError;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AtrioError> {
    Ok(PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?)
}

pub async fn health_check(pool: &PgPool) -> Result<String, AtrioError> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
