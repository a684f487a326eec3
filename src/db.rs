//! Database pool, migrations, and account records

use crate::error::AuthResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// One registered passkey. `public_key` carries the verifier's serialized
/// credential; `counter` mirrors the authenticator signature counter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredPasskey {
    pub id: String,
    pub user_id: i64,
    pub public_key: Vec<u8>,
    pub counter: i64,
    pub transports: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredPasskey {
    /// Transport hints as a list; the column stores them as a JSON array.
    pub fn transport_list(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// Initialize the database and run migrations
pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if database_url.starts_with("sqlite://") {
        let path = database_url.trim_start_matches("sqlite://");
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Get user by username
pub async fn get_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> AuthResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, created_at FROM users WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Get user by id
pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> AuthResult<Option<User>> {
    let user =
        sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(user)
}

/// Idempotent account upsert. Registration calls this before issuing a
/// challenge so the user row always exists by verify time.
pub async fn ensure_user(pool: &SqlitePool, username: &str) -> AuthResult<User> {
    let now = Utc::now();

    sqlx::query("INSERT INTO users (username, created_at) VALUES (?1, ?2) ON CONFLICT (username) DO NOTHING")
        .bind(username)
        .bind(now)
        .execute(pool)
        .await?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, created_at FROM users WHERE username = ?1",
    )
    .bind(username)
    .fetch_one(pool)
    .await?;

    Ok(user)
}
