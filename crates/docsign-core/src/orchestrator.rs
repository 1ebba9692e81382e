//! Document signing orchestration
//!
//! Composes key generation, placeholder injection and ByteRange signing
//! into a single call. Each call owns its buffers; a failure at any stage
//! drops them and returns the error, so callers either get a fully signed
//! document or nothing.

use crate::config::SigningConfig;
use crate::error::Result;
use crate::state::SigningState;
use chrono::{DateTime, Utc};
use shared_crypto::{CertificateBundle, DetachedSigner, KeyPair, SignatureValue};
use shared_pdf::{
    inject_placeholder, resolve_byte_range, ByteRange, PdfError, PlaceholderOptions, SignedPdf,
};
use std::fmt;

/// Everything a signing call hands back
#[derive(Clone)]
pub struct SignedDocument {
    /// The signed PDF, same length as the injected document
    pub signed_bytes: Vec<u8>,
    /// RSA signature over the unmodified input, made with the generated
    /// key pair. It is independent of the embedded signature.
    pub signature_value: SignatureValue,
    /// Generated public key, SPKI PEM
    pub public_key: String,
    /// Generated private key, encrypted PKCS#8 PEM
    pub private_key: String,
    pub byte_range: ByteRange,
    /// The CMS blob embedded in `Contents`, without padding
    pub embedded_signature: SignatureValue,
}

impl fmt::Debug for SignedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedDocument")
            .field("signed_len", &self.signed_bytes.len())
            .field("signature_value", &self.signature_value)
            .field("byte_range", &self.byte_range)
            .field("embedded_signature", &self.embedded_signature)
            .finish_non_exhaustive()
    }
}

/// Signs documents with a fixed configuration. Holds no mutable state, so
/// one signer can serve any number of threads.
#[derive(Debug, Clone)]
pub struct DocumentSigner {
    config: SigningConfig,
}

impl DocumentSigner {
    pub fn new(config: SigningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Fresh key pair for the standalone signature
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        Ok(self.config.key_provider().generate_key_pair()?)
    }

    /// Inject a placeholder of the configured capacity, stamped with the
    /// current time
    pub fn inject_placeholder(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(inject_placeholder(pdf_bytes, &self.placeholder_options(Utc::now()))?)
    }

    /// Resolve and sign an already injected document
    pub fn sign_in_place<S>(&self, injected: &[u8], signer: &S) -> Result<SignedPdf>
    where
        S: DetachedSigner + ?Sized,
    {
        Ok(shared_pdf::sign_in_place(
            injected,
            signer,
            self.config.digest_algorithm,
        )?)
    }

    /// Parse a PEM certificate bundle and sign with it
    pub fn sign_document_pem(
        &self,
        pdf_bytes: &[u8],
        bundle_pem: &[u8],
        passphrase: Option<&str>,
    ) -> Result<SignedDocument> {
        let bundle = CertificateBundle::from_pem(bundle_pem, passphrase)?;
        self.sign_document(pdf_bytes, &bundle)
    }

    /// Sign `pdf_bytes`, embedding a detached signature produced by
    /// `signer`. The signature dictionary's `M` entry is the current time.
    pub fn sign_document<S>(&self, pdf_bytes: &[u8], signer: &S) -> Result<SignedDocument>
    where
        S: DetachedSigner + ?Sized,
    {
        self.sign_document_at(pdf_bytes, signer, Utc::now())
    }

    /// Sign with a fixed `M` entry. Two calls with the same input, config
    /// and `signing_time` produce identical bytes outside `Contents`.
    pub fn sign_document_at<S>(
        &self,
        pdf_bytes: &[u8],
        signer: &S,
        signing_time: DateTime<Utc>,
    ) -> Result<SignedDocument>
    where
        S: DetachedSigner + ?Sized,
    {
        let span = tracing::info_span!("sign_document", input_len = pdf_bytes.len());
        let _enter = span.enter();

        let algorithm = self.config.digest_algorithm;

        let key_pair = self.generate_key_pair()?;
        let signature_value = key_pair.sign(pdf_bytes, algorithm)?;
        tracing::debug!(
            signature_len = signature_value.len(),
            "Computed standalone signature"
        );

        let injected = inject_placeholder(pdf_bytes, &self.placeholder_options(signing_time))?;
        tracing::debug!(
            state = %SigningState::PlaceholderInjected,
            len = injected.len(),
            "Placeholder injected"
        );

        let resolved = resolve_byte_range(&injected)?;
        tracing::debug!(
            state = %SigningState::ByteRangeResolved,
            byte_range = %resolved.byte_range(),
            "ByteRange resolved"
        );

        let digest = resolved.digest(algorithm)?;
        let embedded = signer
            .sign_detached(&digest, algorithm)
            .map_err(PdfError::from)?;
        let signed = resolved.embed(embedded)?;

        tracing::info!(
            output_len = signed.bytes.len(),
            byte_range = %signed.byte_range,
            embedded_len = signed.signature.len(),
            state = %SigningState::Signed,
            "Signed document"
        );

        let KeyPair {
            public_key,
            private_key,
            ..
        } = key_pair;

        Ok(SignedDocument {
            signed_bytes: signed.bytes,
            signature_value,
            public_key,
            private_key,
            byte_range: signed.byte_range,
            embedded_signature: signed.signature,
        })
    }

    fn placeholder_options(&self, signing_time: DateTime<Utc>) -> PlaceholderOptions {
        let metadata = &self.config.metadata;
        PlaceholderOptions {
            name: metadata.name.clone(),
            reason: metadata.reason.clone(),
            location: metadata.location.clone(),
            contact_info: metadata.contact_info.clone(),
            ..PlaceholderOptions::new(self.config.placeholder_capacity)
                .with_signing_time(signing_time)
        }
    }
}

/// Sign with the default configuration
pub fn sign_document<S>(pdf_bytes: &[u8], signer: &S) -> Result<SignedDocument>
where
    S: DetachedSigner + ?Sized,
{
    DocumentSigner::new(SigningConfig::default())?.sign_document(pdf_bytes, signer)
}
