//! Configuration for the keepsake backend

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,

    /// Web server host
    pub host: String,

    /// Web server port
    pub port: u16,

    /// Shared secret gating passkey registration, delivered out-of-band
    pub registration_key: String,

    /// The only usernames allowed to hold accounts
    pub allowed_users: Vec<String>,

    /// Maximum passkeys per account
    pub max_passkeys: i64,

    /// How long an issued ceremony challenge stays valid
    pub challenge_ttl: Duration,

    /// Session lifetime
    pub session_duration: Duration,

    /// Emit `Secure; SameSite=None` session cookies (production deployments)
    pub secure_cookies: bool,

    /// Directory with the built gallery frontend
    pub static_dir: String,

    /// WebAuthn relying party configuration
    pub webauthn: WebAuthnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAuthnConfig {
    pub rp_id: String,
    pub rp_name: String,
    pub rp_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://keepsake.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5173,
            registration_key: generate_secret(),
            allowed_users: vec!["adas".to_string(), "roksanka".to_string()],
            max_passkeys: 3,
            challenge_ttl: Duration::from_secs(5 * 60),
            session_duration: Duration::from_secs(30 * 24 * 60 * 60),
            secure_cookies: false,
            static_dir: "web/dist".to_string(),
            webauthn: WebAuthnConfig {
                rp_id: "localhost".to_string(),
                rp_name: "Nasza Historia".to_string(),
                rp_origin: "http://localhost:5173".to_string(),
            },
        }
    }
}

/// An unset registration key must never match anything a client can send.
fn generate_secret() -> String {
    use base64::{engine::general_purpose, Engine as _};
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    general_purpose::STANDARD.encode(bytes)
}

pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder {
            config: AppConfig::default(),
        }
    }

    /// Load configuration from environment and files
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        if dotenvy::dotenv().is_ok() {
            config =
                config.add_source(config::Environment::with_prefix("KEEPSAKE").separator("__"));
        }

        if std::path::Path::new("keepsake.toml").exists() {
            config = config.add_source(config::File::with_name("keepsake"));
        }

        config.build()?.try_deserialize()
    }
}

impl AppConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn registration_key(mut self, key: impl Into<String>) -> Self {
        self.config.registration_key = key.into();
        self
    }

    pub fn allowed_users(mut self, users: Vec<impl Into<String>>) -> Self {
        self.config.allowed_users = users.into_iter().map(|u| u.into()).collect();
        self
    }

    pub fn max_passkeys(mut self, max: i64) -> Self {
        self.config.max_passkeys = max;
        self
    }

    pub fn challenge_ttl(mut self, ttl: Duration) -> Self {
        self.config.challenge_ttl = ttl;
        self
    }

    pub fn session_duration(mut self, duration: Duration) -> Self {
        self.config.session_duration = duration;
        self
    }

    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.config.secure_cookies = secure;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
