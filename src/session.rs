//! Durable browser sessions: opaque bearer tokens delivered in a cookie

use crate::error::{AuthError, AuthResult};
use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt::Write as _;
use std::time::Duration;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// The identity a resolved session maps to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

#[derive(Clone)]
pub struct SessionStore {
    db: SqlitePool,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Issue a fresh session for `user_id` and return its token.
    pub async fn create(&self, user_id: i64) -> AuthResult<String> {
        let token = generate_token();
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.ttl)
            .map_err(|e| AuthError::Internal(format!("bad session duration: {e}")))?;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    /// Resolve a token to its owner, or `None` for unknown and expired tokens
    /// alike. Expired rows are filtered here, not purged.
    pub async fn resolve(&self, token: &str) -> AuthResult<Option<SessionUser>> {
        let now = Utc::now();

        let user = sqlx::query_as::<_, SessionUser>(
            "SELECT s.user_id, u.username FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.id = ?1 AND s.expires_at > ?2",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// Idempotent delete; revoking an unknown token is not an error.
    pub async fn revoke(&self, token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(token)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// `Set-Cookie` value for a freshly issued session.
    pub fn cookie_for(&self, token: &str, secure: bool) -> String {
        let attrs = if secure {
            "; Secure; SameSite=None"
        } else {
            "; SameSite=Lax"
        };
        format!(
            "{SESSION_COOKIE}={token}; HttpOnly; Path=/; Max-Age={}{attrs}",
            self.ttl.as_secs()
        )
    }

    /// `Set-Cookie` value that clears the session cookie.
    pub fn clearing_cookie() -> String {
        format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0")
    }
}

/// 32 random bytes from the OS, hex-encoded: 256 bits of entropy.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    bytes.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}


#[cfg(test)]
impl SessionStore {
    fn new_for_cookie_tests() -> Self {
        Self {
            db: SqlitePool::connect_lazy("sqlite::memory:").expect("lazy pool"),
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}
