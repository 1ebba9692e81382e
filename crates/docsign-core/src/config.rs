//! Signing configuration
//!
//! Loaded once and captured by value when a [`DocumentSigner`] is built, so
//! every concurrent call sees the same placeholder capacity for its whole
//! lifetime.
//!
//! [`DocumentSigner`]: crate::orchestrator::DocumentSigner

use crate::error::{Result, SigningError};
use serde::{Deserialize, Serialize};
use shared_crypto::keys::MIN_KEY_BITS;
use shared_crypto::{DigestAlgorithm, KeyMaterialProvider};
use shared_pdf::DEFAULT_PLACEHOLDER_CAPACITY;
use std::str::FromStr;

pub const ENV_PLACEHOLDER_CAPACITY: &str = "DOCSIGN_PLACEHOLDER_CAPACITY";
pub const ENV_KEY_BITS: &str = "DOCSIGN_KEY_BITS";
pub const ENV_KEY_ENCRYPTION_ROUNDS: &str = "DOCSIGN_KEY_ENCRYPTION_ROUNDS";
pub const ENV_DIGEST: &str = "DOCSIGN_DIGEST";

/// Optional entries written into the signature dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureMetadata {
    pub name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signature bytes reserved in the placeholder. Must cover the CMS blob
    /// including the whole certificate chain.
    pub placeholder_capacity: usize,
    /// RSA modulus size for the generated key pair
    pub key_bits: usize,
    /// PBKDF2 iterations protecting the generated private key
    pub key_encryption_rounds: u32,
    pub digest_algorithm: DigestAlgorithm,
    pub metadata: SignatureMetadata,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            placeholder_capacity: DEFAULT_PLACEHOLDER_CAPACITY,
            key_bits: KeyMaterialProvider::DEFAULT_BITS,
            key_encryption_rounds: KeyMaterialProvider::DEFAULT_ENCRYPTION_ROUNDS,
            digest_algorithm: DigestAlgorithm::default(),
            metadata: SignatureMetadata::default(),
        }
    }
}

impl SigningConfig {
    /// Defaults overridden by `DOCSIGN_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `DOCSIGN_*` key
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PLACEHOLDER_CAPACITY) {
            config.placeholder_capacity = parse_var(ENV_PLACEHOLDER_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_KEY_BITS) {
            config.key_bits = parse_var(ENV_KEY_BITS, &value)?;
        }
        if let Some(value) = lookup(ENV_KEY_ENCRYPTION_ROUNDS) {
            config.key_encryption_rounds = parse_var(ENV_KEY_ENCRYPTION_ROUNDS, &value)?;
        }
        if let Some(value) = lookup(ENV_DIGEST) {
            config.digest_algorithm = DigestAlgorithm::from_str(&value)
                .map_err(|e| SigningError::InvalidConfig(format!("{}: {}", ENV_DIGEST, e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SigningError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.placeholder_capacity == 0 {
            return Err(SigningError::InvalidConfig(
                "placeholder_capacity must be greater than zero".to_string(),
            ));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(SigningError::InvalidConfig(format!(
                "key_bits must be at least {}, got {}",
                MIN_KEY_BITS, self.key_bits
            )));
        }
        if self.key_encryption_rounds == 0 {
            return Err(SigningError::InvalidConfig(
                "key_encryption_rounds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn key_provider(&self) -> KeyMaterialProvider {
        KeyMaterialProvider::new(self.key_bits, self.key_encryption_rounds)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SigningError::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}
