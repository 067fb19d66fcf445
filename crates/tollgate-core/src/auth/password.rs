//! One-way password hashing.
//!
//! Encoded hashes are tagged with their scheme, e.g.
//! `{pbkdf2}$pbkdf2-sha256$i=185000,l=32$<salt>$<hash>` or
//! `{argon2}$argon2id$v=19$...`, so the default scheme can change without
//! invalidating stored hashes.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    Output, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 185_000;

/// Lowest iteration count accepted by configuration.
pub const MIN_ITERATIONS: u32 = 180_000;

/// Hashes claiming more rounds than this are refused without being computed.
pub const MAX_ITERATIONS: u32 = 10_000_000;

const DERIVED_KEY_LEN: usize = 32;

// Hex `salt || key` bodies written by older deployments.
const LEGACY_SALT_LEN: usize = 8;
const LEGACY_ITERATIONS: u32 = 185_000;

/// Password hashing errors.
///
/// Only raised when hashing itself fails; verification never errors.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// The underlying primitive failed.
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Supported hashing schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    /// PBKDF2-HMAC-SHA-256.
    #[default]
    Pbkdf2,
    /// Argon2id.
    Argon2,
}

impl PasswordScheme {
    /// Tag written in front of encoded hashes.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Pbkdf2 => "pbkdf2",
            Self::Argon2 => "argon2",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "pbkdf2" => Some(Self::Pbkdf2),
            "argon2" => Some(Self::Argon2),
            _ => None,
        }
    }
}

impl std::fmt::Display for PasswordScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Split `{tag}body` into its parts.
///
/// `Ok(None)` means untagged, `Err(())` means an unterminated tag.
fn split_tag(encoded: &str) -> Result<Option<(&str, &str)>, ()> {
    let Some(rest) = encoded.strip_prefix('{') else {
        return Ok(None);
    };
    rest.split_once('}').map(Some).ok_or(())
}

/// Password hasher with a configured default scheme.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    scheme: PasswordScheme,
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(PasswordScheme::Pbkdf2, DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    /// Create a hasher. `iterations` applies to PBKDF2 only.
    #[must_use]
    pub const fn new(scheme: PasswordScheme, iterations: u32) -> Self {
        Self { scheme, iterations }
    }

    /// PBKDF2 hasher with a custom iteration count.
    #[must_use]
    pub const fn with_iterations(iterations: u32) -> Self {
        Self::new(PasswordScheme::Pbkdf2, iterations)
    }

    /// Default scheme for new hashes.
    #[must_use]
    pub const fn scheme(&self) -> PasswordScheme {
        self.scheme
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns error if the hashing primitive fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let body = match self.scheme {
            PasswordScheme::Pbkdf2 => {
                let params = Params {
                    rounds: self.iterations,
                    output_length: DERIVED_KEY_LEN,
                };
                Pbkdf2
                    .hash_password_customized(
                        plaintext.as_bytes(),
                        Some(Algorithm::Pbkdf2Sha256.ident()),
                        None,
                        params,
                        &salt,
                    )
                    .map(|h| h.to_string())
            }
            PasswordScheme::Argon2 => Argon2::default()
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|h| h.to_string()),
        }
        .map_err(|e| PasswordError::Hash(e.to_string()))?;

        Ok(format!("{{{}}}{body}", self.scheme.tag()))
    }

    /// Check a password against an encoded hash.
    ///
    /// Returns `false` on mismatch, malformed input or an unknown tag.
    #[must_use]
    pub fn verify(&self, plaintext: &str, encoded: &str) -> bool {
        let (scheme, body) = match split_tag(encoded) {
            Ok(Some((tag, body))) => match PasswordScheme::from_tag(tag) {
                Some(scheme) => (scheme, body),
                None => return false,
            },
            Ok(None) => (self.scheme, encoded),
            Err(()) => return false,
        };

        match scheme {
            PasswordScheme::Pbkdf2 => verify_pbkdf2(plaintext, body),
            PasswordScheme::Argon2 => verify_argon2(plaintext, body),
        }
    }

    /// Whether a stored hash should be replaced on next successful sign-in.
    #[must_use]
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        let Ok(Some((tag, body))) = split_tag(encoded) else {
            return true;
        };
        if PasswordScheme::from_tag(tag) != Some(self.scheme) {
            return true;
        }

        match self.scheme {
            PasswordScheme::Pbkdf2 => PasswordHash::new(body)
                .ok()
                .and_then(|h| h.params.get_decimal("i"))
                .is_none_or(|rounds| rounds < self.iterations),
            PasswordScheme::Argon2 => PasswordHash::new(body).is_err(),
        }
    }
}

fn verify_pbkdf2(plaintext: &str, body: &str) -> bool {
    if body.starts_with('$') {
        let Ok(hash) = PasswordHash::new(body) else {
            return false;
        };
        match hash.params.get_decimal("i") {
            Some(rounds) if rounds <= MAX_ITERATIONS => {}
            _ => return false,
        }
        Pbkdf2.verify_password(plaintext.as_bytes(), &hash).is_ok()
    } else {
        verify_legacy_pbkdf2(plaintext, body)
    }
}

fn verify_legacy_pbkdf2(plaintext: &str, body: &str) -> bool {
    let Ok(raw) = hex::decode(body) else {
        return false;
    };
    if raw.len() != LEGACY_SALT_LEN + DERIVED_KEY_LEN {
        return false;
    }
    let (salt, expected) = raw.split_at(LEGACY_SALT_LEN);

    let mut derived = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt, LEGACY_ITERATIONS, &mut derived);

    // Output equality is constant-time.
    match (Output::new(&derived), Output::new(expected)) {
        (Ok(actual), Ok(expected)) => actual == expected,
        _ => false,
    }
}

fn verify_argon2(plaintext: &str, body: &str) -> bool {
    PasswordHash::new(body).is_ok_and(|hash| {
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &hash)
            .is_ok()
    })
}
