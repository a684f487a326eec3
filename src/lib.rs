//! Keepsake - passkey-protected backend for a shared photo gallery.
//!
//! Two named accounts sign in with WebAuthn passkeys; sessions ride in an
//! HttpOnly cookie and gate every mutation of the shared photo wall.

pub mod auth_middleware;
pub mod ceremony;
pub mod challenge;
pub mod config;
pub mod credential;
pub mod db;
pub mod error;
pub mod photos;
pub mod security;
pub mod session;
pub mod web;
pub mod webauthn;

pub use ceremony::{CeremonyOutcome, CeremonyService};
pub use config::AppConfig;
pub use error::{AuthError, AuthResult};
pub use session::{SessionStore, SessionUser};

use crate::challenge::{ChallengeStore, SqliteChallengeStore};
use crate::credential::CredentialRegistry;
use crate::webauthn::{CeremonyVerifier, WebAuthnVerifier};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Main authentication context shared across the application
#[derive(Clone)]
pub struct AuthContext {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub verifier: Arc<dyn CeremonyVerifier>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub credentials: CredentialRegistry,
    pub sessions: SessionStore,
}

impl AuthContext {
    pub async fn new(config: AppConfig) -> AuthResult<Self> {
        let db = db::init_db(&config.database_url).await?;
        let verifier: Arc<dyn CeremonyVerifier> = Arc::new(WebAuthnVerifier::new(&config.webauthn)?);

        Ok(Self::assemble(db, config, verifier))
    }

    /// Wire a context from an existing pool and verifier. Tests use this to
    /// substitute the crypto boundary and a single-connection in-memory pool.
    pub fn assemble(
        db: SqlitePool,
        config: AppConfig,
        verifier: Arc<dyn CeremonyVerifier>,
    ) -> Self {
        let config = Arc::new(config);
        let challenges: Arc<dyn ChallengeStore> = Arc::new(SqliteChallengeStore::new(
            db.clone(),
            config.challenge_ttl,
        ));
        let credentials = CredentialRegistry::new(db.clone(), config.max_passkeys);
        let sessions = SessionStore::new(db.clone(), config.session_duration);

        Self {
            db,
            config,
            verifier,
            challenges,
            credentials,
            sessions,
        }
    }
}
