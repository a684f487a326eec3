//! Registered passkey bookkeeping

use crate::db::StoredPasskey;
use crate::error::{AuthError, AuthResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// Credential id plus transport hints, enough to build an allow/exclude list
/// for ceremony options.
#[derive(Debug, Clone)]
pub struct PasskeyDescriptor {
    pub id: String,
    pub transports: Vec<String>,
}

#[derive(Clone)]
pub struct CredentialRegistry {
    db: SqlitePool,
    max_per_user: i64,
}

impl CredentialRegistry {
    pub fn new(db: SqlitePool, max_per_user: i64) -> Self {
        Self { db, max_per_user }
    }

    pub async fn count_for_user(&self, user_id: i64) -> AuthResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM passkeys WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;

        Ok(count)
    }

    pub async fn list_for_user(&self, user_id: i64) -> AuthResult<Vec<StoredPasskey>> {
        let passkeys = sqlx::query_as::<_, StoredPasskey>(
            "SELECT id, user_id, public_key, counter, transports, created_at
             FROM passkeys WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(passkeys)
    }

    pub async fn descriptors_for_user(&self, user_id: i64) -> AuthResult<Vec<PasskeyDescriptor>> {
        let passkeys = self.list_for_user(user_id).await?;

        Ok(passkeys
            .iter()
            .map(|p| PasskeyDescriptor {
                id: p.id.clone(),
                transports: p.transport_list(),
            })
            .collect())
    }

    pub async fn get(&self, credential_id: &str) -> AuthResult<Option<StoredPasskey>> {
        let passkey = sqlx::query_as::<_, StoredPasskey>(
            "SELECT id, user_id, public_key, counter, transports, created_at
             FROM passkeys WHERE id = ?1",
        )
        .bind(credential_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(passkey)
    }

    /// Store a freshly verified credential. The per-user cap is re-checked in
    /// the same transaction as the insert, so concurrent registrations cannot
    /// race past it even though the orchestrator checks earlier too.
    pub async fn register(
        &self,
        credential_id: &str,
        user_id: i64,
        public_key: &[u8],
        counter: u32,
        transports: &[String],
    ) -> AuthResult<()> {
        let transports_json = serde_json::to_string(transports)?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM passkeys WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        if count >= self.max_per_user {
            return Err(AuthError::CapacityExceeded);
        }

        sqlx::query(
            "INSERT INTO passkeys (id, user_id, public_key, counter, transports, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(credential_id)
        .bind(user_id)
        .bind(public_key)
        .bind(counter as i64)
        .bind(transports_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Apply the counter reported by a successful authentication.
    ///
    /// The counter must never go backwards; a lower value than what is stored
    /// means a cloned authenticator or a replayed response and is rejected,
    /// leaving the stored counter untouched.
    pub async fn update_counter(&self, credential_id: &str, new_counter: u32) -> AuthResult<()> {
        let new_counter = new_counter as i64;

        let result = sqlx::query(
            "UPDATE passkeys SET counter = ?1 WHERE id = ?2 AND counter <= ?1",
        )
        .bind(new_counter)
        .bind(credential_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(credential_id).await? {
                Some(stored) => {
                    tracing::warn!(
                        credential_id,
                        stored = stored.counter,
                        reported = new_counter,
                        "signature counter regression, rejecting authentication"
                    );
                    Err(AuthError::CounterRegression)
                }
                None => Err(AuthError::CredentialNotFound),
            };
        }

        Ok(())
    }
}
