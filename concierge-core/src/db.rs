use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Create the `bookings` and `content_chunks` tables if they are missing.
///
/// `dimensions` fixes the width of the `embedding` column and must match the
/// embedding model configured under `[embedding]`.
pub async fn ensure_schema(pool: &PgPool, dimensions: u32) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            booking_id  TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL,
            phone       TEXT NOT NULL,
            address     TEXT NOT NULL,
            service     TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL,
            status      TEXT NOT NULL DEFAULT 'active'
        )
        "#,
    )
    .execute(pool)
    .await?;

    let chunks_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS content_chunks (
            id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            source_url   TEXT NOT NULL,
            category     TEXT NOT NULL,
            chunk_index  INTEGER NOT NULL,
            content      TEXT NOT NULL,
            embedding    vector({dimensions}) NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (source_url, chunk_index)
        )
        "#
    );
    sqlx::query(&chunks_ddl).execute(pool).await?;

    tracing::info!(dimensions, "Database schema ensured");
    Ok(())
}
