//! Signing secret handling.
//!
//! - `SigningSecret`: configured secret that never shows up in logs
//! - `SigningKey`: HMAC key material derived once from the secret at startup

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

/// Placeholder secret used when none is configured.
///
/// Anything signed with it can be forged by whoever reads this file.
pub const DEFAULT_INSECURE_SECRET: &str = "secret";

/// Configured token signing secret.
///
/// Wrapped with `secrecy::SecretBox` so it is not printed by `Debug`,
/// `Display` or config serialization.
#[derive(Clone)]
pub struct SigningSecret(SecretBox<str>);

impl SigningSecret {
    /// Wrap a secret string.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretBox::new(secret.into().into_boxed_str()))
    }

    /// Generate a random 256-bit secret, hex-encoded.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut *bytes);
        Self::new(hex::encode(&*bytes))
    }

    /// Expose the secret text.
    ///
    /// Only key derivation and the CLI's `secret generate` output need this.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether this is still the insecure placeholder.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.expose() == DEFAULT_INSECURE_SECRET
    }

    /// Derive the HMAC key: the UTF-8 bytes of the base64-encoded secret.
    #[must_use]
    pub fn derive_key(&self) -> SigningKey {
        SigningKey(Zeroizing::new(
            STANDARD.encode(self.expose().as_bytes()).into_bytes(),
        ))
    }
}

impl Default for SigningSecret {
    fn default() -> Self {
        Self::new(DEFAULT_INSECURE_SECRET)
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret([REDACTED])")
    }
}

impl std::fmt::Display for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for SigningSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// HMAC-SHA-256 key bytes, wiped on drop.
pub struct SigningKey(Zeroizing<Vec<u8>>);

impl SigningKey {
    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}
