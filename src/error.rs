//! Error taxonomy and HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every failure the authentication core can produce.
///
/// Client errors and security-policy rejections carry a short reason that is
/// safe to show; infrastructure errors are logged in full and returned opaque.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Username is not on the account allow-list
    #[error("Invalid username")]
    InvalidUser,

    /// Registration secret did not match the configured value
    #[error("Invalid registration key")]
    InvalidRegistrationKey,

    /// The user already holds the maximum number of passkeys
    #[error("Maximum passkeys reached")]
    CapacityExceeded,

    /// Malformed or incomplete request payload
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No live challenge for this username: never issued, already consumed,
    /// or past its expiry. The ceremony must restart from the options phase.
    #[error("Challenge expired or not found")]
    ChallengeExpired,

    #[error("User not found")]
    UserNotFound,

    /// Authentication was attempted before any passkey was registered
    #[error("No passkeys registered")]
    NoCredentials,

    /// The credential id in the response is not in the registry
    #[error("Passkey not found")]
    CredentialNotFound,

    /// The external verifier rejected the ceremony response
    #[error("Verification failed")]
    VerificationFailed,

    /// Signature counter went backwards: a cloned authenticator or a replayed
    /// response. Terminal, and distinct from an ordinary verification failure.
    #[error("Signature counter regression")]
    CounterRegression,

    /// Request reached a protected route without a usable session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A referenced resource outside the auth core does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebAuthn error: {0}")]
    WebAuthn(#[from] webauthn_rs::prelude::WebauthnError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidUser => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::InvalidRegistrationKey => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::CapacityExceeded => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::ChallengeExpired => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AuthError::NoCredentials => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::CredentialNotFound => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::VerificationFailed => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::CounterRegression => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::NotAuthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AuthError::Database(e) => {
                tracing::error!("database error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AuthError::Serialization(e) => {
                tracing::error!("serialization error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
            AuthError::WebAuthn(e) => {
                tracing::error!("webauthn error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
            AuthError::Internal(e) => {
                tracing::error!("internal error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
