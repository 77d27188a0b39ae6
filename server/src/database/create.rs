use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::database::users::DirectoryError;

const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) the SQLite file at `path` and make sure the
/// schema exists.
pub async fn connect(path: &Path) -> Result<SqlitePool, DirectoryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    create_tables(&pool).await?;
    info!("User database ready at {}", path.display());
    Ok(pool)
}

/// Initialize the schema. Safe to run on every start.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), DirectoryError> {
    // AUTOINCREMENT keeps ids of deleted or explicitly seeded rows from
    // being handed out again.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            email         TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            role          TEXT    NOT NULL DEFAULT 'user',
            created_at    INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
