//! The cryptographic verification boundary.
//!
//! The ceremony orchestrator never touches attestation or assertion
//! verification itself; it hands the stored ceremony state and the client's
//! response to a [`CeremonyVerifier`] and consumes the outcome. The shipped
//! implementation wraps `webauthn-rs`; tests substitute a stub.

use crate::config::WebAuthnConfig;
use crate::db::StoredPasskey;
use crate::error::{AuthError, AuthResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use webauthn_rs::prelude::*;

/// Options phase output: client-facing options plus the opaque state the
/// verify phase will need. The state goes into the challenge store.
#[derive(Debug, Clone)]
pub struct CeremonyChallenge {
    pub options: Value,
    pub state: Vec<u8>,
}

/// A credential accepted by the verifier at the end of registration.
#[derive(Debug, Clone)]
pub struct RegisteredPasskey {
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub transports: Vec<String>,
}

/// A successful authentication: which credential signed, and the counter the
/// authenticator now reports.
#[derive(Debug, Clone)]
pub struct AuthVerdict {
    pub credential_id: String,
    pub counter: u32,
}

pub trait CeremonyVerifier: Send + Sync {
    fn start_registration(
        &self,
        username: &str,
        exclude: &[crate::credential::PasskeyDescriptor],
    ) -> AuthResult<CeremonyChallenge>;

    fn finish_registration(&self, credential: &Value, state: &[u8])
        -> AuthResult<RegisteredPasskey>;

    fn start_authentication(&self, allowed: &[StoredPasskey]) -> AuthResult<CeremonyChallenge>;

    fn finish_authentication(&self, credential: &Value, state: &[u8]) -> AuthResult<AuthVerdict>;
}

/// Production verifier backed by `webauthn-rs`.
pub struct WebAuthnVerifier {
    webauthn: Webauthn,
}

impl WebAuthnVerifier {
    pub fn new(config: &WebAuthnConfig) -> AuthResult<Self> {
        let rp_origin = Url::parse(&config.rp_origin)
            .map_err(|e| AuthError::Internal(format!("invalid RP origin: {e}")))?;

        let webauthn = WebauthnBuilder::new(&config.rp_id, &rp_origin)?
            .rp_name(&config.rp_name)
            .build()?;

        Ok(Self { webauthn })
    }
}

impl CeremonyVerifier for WebAuthnVerifier {
    fn start_registration(
        &self,
        username: &str,
        exclude: &[crate::credential::PasskeyDescriptor],
    ) -> AuthResult<CeremonyChallenge> {
        let exclude_ids: Vec<CredentialID> = exclude
            .iter()
            .filter_map(|d| URL_SAFE_NO_PAD.decode(&d.id).ok())
            .map(CredentialID::from)
            .collect();

        let (ccr, reg_state) = self.webauthn.start_passkey_registration(
            Uuid::new_v4(),
            username,
            username,
            Some(exclude_ids),
        )?;

        let mut options = serde_json::to_value(&ccr)?;

        // The gallery accounts sign in with discoverable credentials; the
        // passkey API does not expose the selection criteria directly.
        options["publicKey"]["authenticatorSelection"] = json!({
            "residentKey": "required",
            "requireResidentKey": true,
            "userVerification": "preferred",
        });

        let state = serde_json::to_vec(&reg_state)?;

        Ok(CeremonyChallenge { options, state })
    }

    fn finish_registration(
        &self,
        credential: &Value,
        state: &[u8],
    ) -> AuthResult<RegisteredPasskey> {
        let reg_state: PasskeyRegistration = serde_json::from_slice(state)
            .map_err(|e| AuthError::Internal(format!("corrupt registration state: {e}")))?;

        let response: RegisterPublicKeyCredential = serde_json::from_value(credential.clone())
            .map_err(|e| AuthError::BadRequest(format!("Invalid credential response: {e}")))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&response, &reg_state)
            .map_err(|e| {
                tracing::debug!("registration verification rejected: {e:?}");
                AuthError::VerificationFailed
            })?;

        let credential_id = URL_SAFE_NO_PAD.encode(passkey.cred_id());
        let public_key = serde_json::to_vec(&passkey)?;

        // Transport hints ride alongside the attestation rather than inside it.
        let transports = credential
            .pointer("/response/transports")
            .and_then(Value::as_array)
            .map(|t| {
                t.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(RegisteredPasskey {
            credential_id,
            public_key,
            counter: 0,
            transports,
        })
    }

    fn start_authentication(&self, allowed: &[StoredPasskey]) -> AuthResult<CeremonyChallenge> {
        let passkeys: Vec<Passkey> = allowed
            .iter()
            .filter_map(|p| serde_json::from_slice(&p.public_key).ok())
            .collect();

        if passkeys.is_empty() {
            return Err(AuthError::Internal(
                "no stored passkey could be loaded".to_string(),
            ));
        }

        let (rcr, auth_state) = self.webauthn.start_passkey_authentication(&passkeys)?;

        let options = serde_json::to_value(&rcr)?;
        let state = serde_json::to_vec(&auth_state)?;

        Ok(CeremonyChallenge { options, state })
    }

    fn finish_authentication(&self, credential: &Value, state: &[u8]) -> AuthResult<AuthVerdict> {
        let auth_state: PasskeyAuthentication = serde_json::from_slice(state)
            .map_err(|e| AuthError::Internal(format!("corrupt authentication state: {e}")))?;

        let response: PublicKeyCredential = serde_json::from_value(credential.clone())
            .map_err(|e| AuthError::BadRequest(format!("Invalid credential response: {e}")))?;

        let result = self
            .webauthn
            .finish_passkey_authentication(&response, &auth_state)
            .map_err(|e| {
                tracing::debug!("authentication verification rejected: {e:?}");
                AuthError::VerificationFailed
            })?;

        Ok(AuthVerdict {
            credential_id: URL_SAFE_NO_PAD.encode(result.cred_id()),
            counter: result.counter(),
        })
    }
}
