//! Pending ceremony challenges: one per username, five minutes, single use

use crate::error::AuthResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

/// Which ceremony issued a stored challenge. A challenge issued for one
/// ceremony never satisfies the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration",
            CeremonyKind::Authentication => "authentication",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "registration" => Some(CeremonyKind::Registration),
            "authentication" => Some(CeremonyKind::Authentication),
            _ => None,
        }
    }
}

/// A challenge pulled out of the store by `take_and_invalidate`.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub ceremony: CeremonyKind,
    pub state: Vec<u8>,
}

/// Store of at most one live challenge per username.
///
/// `put` supersedes whatever was there (last write wins); consuming is
/// destructive whether or not the subsequent verification succeeds. Backing
/// engines must make both operations atomic per username.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn put(&self, username: &str, ceremony: CeremonyKind, state: &[u8]) -> AuthResult<()>;

    /// Atomically read and delete the challenge for `username`. Returns `None`
    /// when there is no row or the row's expiry has passed; expiry is
    /// evaluated here at read time, not by any background sweep.
    async fn take_and_invalidate(&self, username: &str) -> AuthResult<Option<PendingChallenge>>;
}

/// SQLite-backed challenge store.
#[derive(Clone)]
pub struct SqliteChallengeStore {
    db: SqlitePool,
    ttl: Duration,
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    ceremony: String,
    state: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl SqliteChallengeStore {
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    fn expiry(&self) -> AuthResult<DateTime<Utc>> {
        let ttl = ChronoDuration::from_std(self.ttl)
            .map_err(|e| crate::error::AuthError::Internal(format!("bad challenge ttl: {e}")))?;
        Ok(Utc::now() + ttl)
    }
}

#[async_trait]
impl ChallengeStore for SqliteChallengeStore {
    async fn put(&self, username: &str, ceremony: CeremonyKind, state: &[u8]) -> AuthResult<()> {
        let now = Utc::now();
        let expires_at = self.expiry()?;

        sqlx::query(
            "INSERT INTO challenges (username, ceremony, state, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (username) DO UPDATE
             SET ceremony = excluded.ceremony,
                 state = excluded.state,
                 expires_at = excluded.expires_at,
                 created_at = excluded.created_at",
        )
        .bind(username)
        .bind(ceremony.as_str())
        .bind(state)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn take_and_invalidate(&self, username: &str) -> AuthResult<Option<PendingChallenge>> {
        // Read and delete inside one transaction so two concurrent verify
        // attempts cannot both consume the same challenge.
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ChallengeRow>(
            "SELECT ceremony, state, expires_at FROM challenges WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM challenges WHERE username = ?1")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if row.expires_at <= Utc::now() {
            return Ok(None);
        }

        let Some(ceremony) = CeremonyKind::from_str(&row.ceremony) else {
            return Ok(None);
        };

        Ok(Some(PendingChallenge {
            ceremony,
            state: row.state,
        }))
    }
}
