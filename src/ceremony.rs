//! Ceremony orchestration.
//!
//! Both WebAuthn ceremonies follow one shape: an options phase that issues a
//! challenge, and a verify phase that consumes it, delegates to the verifier,
//! mutates the stores, and issues a session. The verify skeleton is shared;
//! a [`CeremonyKind`] tag selects the ceremony-specific steps.

use crate::challenge::{CeremonyKind, ChallengeStore as _};
use crate::db;
use crate::error::{AuthError, AuthResult};
use crate::webauthn::CeremonyVerifier as _;
use crate::AuthContext;
use serde_json::Value;
use tracing::info;

/// A completed ceremony: who signed in, and the session token the caller
/// should deliver as a cookie.
#[derive(Debug, Clone)]
pub struct CeremonyOutcome {
    pub username: String,
    pub token: String,
}

pub struct CeremonyService {
    ctx: AuthContext,
}

impl CeremonyService {
    pub fn new(ctx: AuthContext) -> Self {
        Self { ctx }
    }

    /// Registration options phase.
    ///
    /// Precondition order matters: allow-list, then the shared registration
    /// secret, then the idempotent user upsert, then the passkey cap. Nothing
    /// is mutated before the secret has been checked.
    pub async fn registration_options(
        &self,
        username: &str,
        registration_key: &str,
    ) -> AuthResult<Value> {
        if !self.ctx.config.allowed_users.iter().any(|u| u == username) {
            return Err(AuthError::InvalidUser);
        }

        if registration_key != self.ctx.config.registration_key {
            return Err(AuthError::InvalidRegistrationKey);
        }

        let user = db::ensure_user(&self.ctx.db, username).await?;

        if self.ctx.credentials.count_for_user(user.id).await? >= self.ctx.config.max_passkeys {
            return Err(AuthError::CapacityExceeded);
        }

        let exclude = self.ctx.credentials.descriptors_for_user(user.id).await?;
        let challenge = self.ctx.verifier.start_registration(username, &exclude)?;

        self.ctx
            .challenges
            .put(username, CeremonyKind::Registration, &challenge.state)
            .await?;

        Ok(challenge.options)
    }

    /// Authentication options phase. The user must already exist and hold at
    /// least one passkey; otherwise registration has to happen first.
    pub async fn authentication_options(&self, username: &str) -> AuthResult<Value> {
        let user = db::get_user_by_username(&self.ctx.db, username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let passkeys = self.ctx.credentials.list_for_user(user.id).await?;
        if passkeys.is_empty() {
            return Err(AuthError::NoCredentials);
        }

        let challenge = self.ctx.verifier.start_authentication(&passkeys)?;

        self.ctx
            .challenges
            .put(username, CeremonyKind::Authentication, &challenge.state)
            .await?;

        Ok(challenge.options)
    }

    /// Shared verify phase for both ceremonies.
    ///
    /// The stored challenge is consumed up front, before any verification: a
    /// failed ceremony still burns its challenge and must restart from the
    /// options phase. A challenge issued for the other ceremony counts as
    /// absent.
    pub async fn verify(
        &self,
        kind: CeremonyKind,
        username: &str,
        credential: &Value,
    ) -> AuthResult<CeremonyOutcome> {
        if username.is_empty() || credential.is_null() {
            return Err(AuthError::BadRequest(
                "Missing username or credential".to_string(),
            ));
        }

        let challenge = self
            .ctx
            .challenges
            .take_and_invalidate(username)
            .await?
            .ok_or(AuthError::ChallengeExpired)?;

        if challenge.ceremony != kind {
            return Err(AuthError::ChallengeExpired);
        }

        let user = match kind {
            CeremonyKind::Registration => {
                self.finish_registration(username, credential, &challenge.state)
                    .await?
            }
            CeremonyKind::Authentication => {
                self.finish_authentication(credential, &challenge.state)
                    .await?
            }
        };

        let token = self.ctx.sessions.create(user.id).await?;

        Ok(CeremonyOutcome {
            username: user.username,
            token,
        })
    }

    /// Registration mutation: store the verified credential.
    async fn finish_registration(
        &self,
        username: &str,
        credential: &Value,
        state: &[u8],
    ) -> AuthResult<db::User> {
        let registered = self.ctx.verifier.finish_registration(credential, state)?;

        let user = db::get_user_by_username(&self.ctx.db, username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.ctx
            .credentials
            .register(
                &registered.credential_id,
                user.id,
                &registered.public_key,
                registered.counter,
                &registered.transports,
            )
            .await?;

        info!(username, credential_id = %registered.credential_id, "registered new passkey");

        Ok(user)
    }

    /// Authentication mutation: advance the signature counter and resolve the
    /// credential's owner. A counter regression is terminal and propagates
    /// as its own error, distinct from a failed verification.
    async fn finish_authentication(
        &self,
        credential: &Value,
        state: &[u8],
    ) -> AuthResult<db::User> {
        let claimed_id = credential
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::BadRequest("Missing credential id".to_string()))?;

        let stored = self
            .ctx
            .credentials
            .get(claimed_id)
            .await?
            .ok_or(AuthError::CredentialNotFound)?;

        let verdict = self.ctx.verifier.finish_authentication(credential, state)?;

        self.ctx
            .credentials
            .update_counter(&verdict.credential_id, verdict.counter)
            .await?;

        let owner = db::get_user_by_id(&self.ctx.db, stored.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(username = %owner.username, credential_id = %verdict.credential_id, "passkey sign-in");

        Ok(owner)
    }
}
