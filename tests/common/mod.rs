//! Common test utilities and helpers

use keepsake::credential::PasskeyDescriptor;
use keepsake::db::StoredPasskey;
use keepsake::webauthn::{AuthVerdict, CeremonyChallenge, CeremonyVerifier, RegisteredPasskey};
use keepsake::{AppConfig, AuthContext, AuthError, AuthResult};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

pub const TEST_REGISTRATION_KEY: &str = "test-registration-key";

/// Test configuration: known registration key, everything else default.
pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .registration_key(TEST_REGISTRATION_KEY)
        .build()
}

/// Context over a single-connection in-memory database (so every query sees
/// the same data) with the crypto boundary stubbed out.
pub async fn test_context() -> AuthContext {
    test_context_with(test_config()).await
}

pub async fn test_context_with(config: AppConfig) -> AuthContext {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    AuthContext::assemble(pool, config, Arc::new(StubVerifier))
}

/// A ceremony response the stub verifier accepts. Set `"fail": true` to make
/// verification reject it.
pub fn stub_credential(id: &str, counter: u64) -> Value {
    json!({
        "id": id,
        "counter": counter,
        "transports": ["internal"],
    })
}

/// Drive a full registration ceremony and return the session token.
pub async fn register_passkey(ctx: &AuthContext, username: &str, cred_id: &str) -> String {
    let service = keepsake::CeremonyService::new(ctx.clone());

    service
        .registration_options(username, TEST_REGISTRATION_KEY)
        .await
        .unwrap();

    let outcome = service
        .verify(
            keepsake::challenge::CeremonyKind::Registration,
            username,
            &stub_credential(cred_id, 0),
        )
        .await
        .unwrap();

    outcome.token
}

/// Stand-in for the WebAuthn library. Echoes the credential id and counter
/// from the posted response so tests control the registry mutations.
pub struct StubVerifier;

impl CeremonyVerifier for StubVerifier {
    fn start_registration(
        &self,
        _username: &str,
        exclude: &[PasskeyDescriptor],
    ) -> AuthResult<CeremonyChallenge> {
        let exclude_ids: Vec<&str> = exclude.iter().map(|d| d.id.as_str()).collect();

        Ok(CeremonyChallenge {
            options: json!({
                "challenge": "stub-registration-challenge",
                "excludeCredentials": exclude_ids,
            }),
            state: b"stub-registration-state".to_vec(),
        })
    }

    fn finish_registration(
        &self,
        credential: &Value,
        _state: &[u8],
    ) -> AuthResult<RegisteredPasskey> {
        if credential["fail"].as_bool().unwrap_or(false) {
            return Err(AuthError::VerificationFailed);
        }

        Ok(RegisteredPasskey {
            credential_id: credential["id"].as_str().unwrap_or("stub-cred").to_string(),
            public_key: b"stub-public-key".to_vec(),
            counter: credential["counter"].as_u64().unwrap_or(0) as u32,
            transports: credential["transports"]
                .as_array()
                .map(|t| {
                    t.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn start_authentication(&self, allowed: &[StoredPasskey]) -> AuthResult<CeremonyChallenge> {
        let allow_ids: Vec<&str> = allowed.iter().map(|p| p.id.as_str()).collect();

        Ok(CeremonyChallenge {
            options: json!({
                "challenge": "stub-authentication-challenge",
                "allowCredentials": allow_ids,
            }),
            state: b"stub-authentication-state".to_vec(),
        })
    }

    fn finish_authentication(&self, credential: &Value, _state: &[u8]) -> AuthResult<AuthVerdict> {
        if credential["fail"].as_bool().unwrap_or(false) {
            return Err(AuthError::VerificationFailed);
        }

        Ok(AuthVerdict {
            credential_id: credential["id"].as_str().unwrap_or("stub-cred").to_string(),
            counter: credential["counter"].as_u64().unwrap_or(0) as u32,
        })
    }
}

/// Assert that a result is an error matching a pattern
#[macro_export]
macro_rules! assert_error_matches {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => (),
            Err(e) => panic!(
                "Expected error matching {}, got {:?}",
                stringify!($pattern),
                e
            ),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    };
}
