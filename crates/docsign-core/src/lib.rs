//! Document signing core logic
//!
//! This crate provides the document signing pipeline: a generated key pair
//! and standalone signature for the caller, plus a detached CMS signature
//! embedded into the PDF through a fixed-capacity placeholder.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use config::{SignatureMetadata, SigningConfig};
pub use error::{ErrorKind, Result, SigningError};
pub use orchestrator::{sign_document, DocumentSigner, SignedDocument};
pub use state::SigningState;

// Re-export types from shared crates
pub use shared_crypto::{
    generate_key_pair, CertificateBundle, DetachedSigner, DigestAlgorithm, KeyMaterialProvider,
    KeyPair, SignatureValue,
};
pub use shared_pdf::{ByteRange, PlaceholderOptions};
