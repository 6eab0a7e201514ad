//! Opens the SQLite pool backing every repository in this crate and
//! initializes the schema once against it.

use crate::schema::create_schema;
use sentinela_common::SystemError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

pub async fn open(database_url: &str, max_connections: u32) -> Result<Pool<Sqlite>, SystemError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    create_schema(&pool).await?;
    tracing::info!(database_url, "sentinela store schema initialized");
    Ok(pool)
}
