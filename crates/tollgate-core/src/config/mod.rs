//! Configuration loading and validation.
//!
//! JSON5 format, camelCase keys.
//! Config location: `~/.tollgate/tollgate.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::{
    AccessPolicy, AccessRule, DEFAULT_ITERATIONS, MIN_ITERATIONS, PasswordHasher, PasswordScheme,
};
use crate::secrets::SigningSecret;

/// Env var overriding the signing secret.
pub const ENV_JWT_SECRET: &str = "TOLLGATE_JWT_SECRET";
/// Env var overriding the access token TTL in milliseconds.
pub const ENV_TOKEN_TTL_MS: &str = "TOLLGATE_TOKEN_TTL_MS";
/// Env var overriding the listen port.
pub const ENV_PORT: &str = "TOLLGATE_PORT";

const MAX_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unusable environment override.
    #[error("Invalid value for {var}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token and password settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Data directory for the user database.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded, parsed or validated.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::read(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("tollgate.json")
    }

    /// Get the Tollgate state directory.
    ///
    /// Uses `TOLLGATE_STATE_DIR` env var if set, otherwise `~/.tollgate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TOLLGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".tollgate")
        } else {
            PathBuf::from(".tollgate")
        }
    }

    /// Resolved data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(|| Self::state_dir().join("data"), |d| d.join("tollgate"))
        })
    }

    /// Path of the user database.
    #[must_use]
    pub fn users_db_path(&self) -> PathBuf {
        self.data_dir().join("users.db")
    }

    /// Apply overrides from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if an override does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_JWT_SECRET).filter(|s| !s.is_empty()) {
            self.security.secret_key = SigningSecret::new(secret);
        }
        if let Some(ttl) = lookup(ENV_TOKEN_TTL_MS) {
            self.security.expire_length_ms = ttl.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_TOKEN_TTL_MS,
                reason: format!("{e}"),
            })?;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_PORT,
                reason: format!("{e}"),
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("Server port cannot be 0".to_string()));
        }

        if self.server.signin_attempts_per_minute == 0 {
            return Err(ConfigError::Validation(
                "signinAttemptsPerMinute must be at least 1".to_string(),
            ));
        }

        if let Some(url) = &self.server.public_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "publicBaseUrl '{url}' must be an http(s) URL"
                )));
            }
        }

        let ttl = self.security.expire_length_ms;
        if ttl == 0 || ttl > MAX_TTL_MS {
            return Err(ConfigError::Validation(format!(
                "expireLengthMs must be between 1000 and {MAX_TTL_MS}, got {ttl}"
            )));
        }
        if ttl % 1000 != 0 {
            return Err(ConfigError::Validation(format!(
                "expireLengthMs must be a whole number of seconds, got {ttl}"
            )));
        }

        if self.security.password_iterations < MIN_ITERATIONS {
            return Err(ConfigError::Validation(format!(
                "passwordIterations must be at least {MIN_ITERATIONS}"
            )));
        }

        Ok(())
    }

    /// Pretty JSON with the signing secret redacted.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_redacted_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Fixed token issuer. Derived from each request when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Sign-in attempts allowed per client per minute.
    #[serde(default = "default_signin_attempts")]
    pub signin_attempts_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            public_base_url: None,
            cors: true,
            timeout_secs: default_timeout(),
            signin_attempts_per_minute: default_signin_attempts(),
        }
    }
}

const fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_timeout() -> u64 {
    30
}

const fn default_signin_attempts() -> u32 {
    30
}

/// Token and password configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Token signing secret. Defaults to an insecure placeholder.
    #[serde(default)]
    pub secret_key: SigningSecret,

    /// Access token lifetime in milliseconds.
    #[serde(default = "default_expire_length")]
    pub expire_length_ms: u64,

    /// Scheme for new password hashes.
    #[serde(default)]
    pub password_scheme: PasswordScheme,

    /// PBKDF2 iterations for new hashes.
    #[serde(default = "default_iterations")]
    pub password_iterations: u32,

    /// Accepted token issuers. Empty accepts any.
    #[serde(default)]
    pub trusted_issuers: Vec<String>,

    /// Route access table, first match wins.
    #[serde(default = "AccessRule::defaults")]
    pub rules: Vec<AccessRule>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: SigningSecret::default(),
            expire_length_ms: default_expire_length(),
            password_scheme: PasswordScheme::default(),
            password_iterations: default_iterations(),
            trusted_issuers: Vec::new(),
            rules: AccessRule::defaults(),
        }
    }
}

impl SecurityConfig {
    /// Password hasher for these settings.
    #[must_use]
    pub const fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.password_scheme, self.password_iterations)
    }

    /// Access policy for these settings.
    #[must_use]
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.rules.clone())
    }
}

const fn default_expire_length() -> u64 {
    3_600_000
}

const fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
