use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use thiserror::Error;
use tracing::{debug, info};

use shared::types::claims::{Role, RoleParseError};
use shared::types::login::UserSummary;
use shared::types::server_config::SeedUser;

use crate::database::create::connect;
use crate::database::utils::{get_timestamp, normalize_email};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("email already registered")]
    EmailTaken,

    #[error("stored role is invalid: {0}")]
    InvalidRole(#[from] RoleParseError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Account row as the auth layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Persistence collaborator used by login, registration, the admin listing
/// and the test-only identity header.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, DirectoryError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    async fn insert_user(&self, new_user: NewUser) -> Result<UserRecord, DirectoryError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;
}

/// User accounts stored in SQLite. Emails are kept normalized, so lookups
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database file at `path`, creating it and the schema
    /// when missing.
    pub async fn open(path: &Path) -> Result<Self, DirectoryError> {
        Ok(Self::new(connect(path).await?))
    }

    /// Insert `[[auth.seed_users]]` accounts whose id is still free. Existing
    /// rows are left untouched, so restarts keep registered users and any
    /// later changes to seeded ones.
    pub async fn seed(&self, seeds: &[SeedUser]) -> Result<usize, DirectoryError> {
        let mut inserted = 0;
        for seed in seeds {
            let result = sqlx::query(
                r#"
                INSERT INTO users (id, email, password_hash, role, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(seed.id)
            .bind(normalize_email(&seed.email))
            .bind(&seed.password_hash)
            .bind(seed.role.as_str())
            .bind(get_timestamp())
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;

            if result.rows_affected() > 0 {
                info!("Seeded user {} ({})", seed.id, seed.role);
                inserted += 1;
            } else {
                debug!("Seed user {} already present", seed.id);
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, DirectoryError> {
        let row = sqlx::query("SELECT id, email, password_hash, role FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let row = sqlx::query("SELECT id, email, password_hash, role FROM users WHERE email = ?1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<UserRecord, DirectoryError> {
        let email = normalize_email(&new_user.email);

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(get_timestamp())
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        let record = UserRecord {
            id: result.last_insert_rowid(),
            email,
            password_hash: new_user.password_hash,
            role: new_user.role,
        };
        info!("New user registered: {}", record.id);
        Ok(record)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let rows = sqlx::query("SELECT id, email, password_hash, role FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<UserRecord, DirectoryError> {
    let role: String = row.try_get("role")?;
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse()?,
    })
}

/// The only unique column besides the key is `email`.
fn map_unique_violation(e: sqlx::Error) -> DirectoryError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => DirectoryError::EmailTaken,
        other => DirectoryError::Database(other),
    }
}
