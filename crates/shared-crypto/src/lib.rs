//! Shared cryptography utilities
//!
//! This crate provides the key material, certificate bundles and detached
//! CMS signing primitive used to sign PDF documents.

pub mod asn1;
pub mod bundle;
pub mod cms;
pub mod error;
pub mod keys;
pub mod signer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bundle::CertificateBundle;
pub use error::{CryptoError, Result};
pub use keys::{generate_key_pair, KeyMaterialProvider, KeyPair, Passphrase};
pub use signer::{DetachedSigner, DigestAlgorithm, SignatureValue};
