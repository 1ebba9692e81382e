//! Error types for the signing pipeline

use crate::state::SigningState;
use shared_crypto::CryptoError;
use shared_pdf::PdfError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Who has to act on a failure. Nothing is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad document or certificate material from the caller
    Input,
    /// Signature did not fit the reserved placeholder
    Capacity,
    /// Key generation, signing or serialization failed underneath
    Primitive,
    /// Rejected configuration values
    Config,
}

impl SigningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SigningError::InvalidConfig(_) => ErrorKind::Config,
            SigningError::Crypto(e) => crypto_kind(e),
            SigningError::Pdf(e) => match e {
                PdfError::MalformedDocument(_) | PdfError::PlaceholderResolution(_) => {
                    ErrorKind::Input
                }
                PdfError::InvalidOptions(_) => ErrorKind::Config,
                PdfError::SignatureTooLarge { .. } => ErrorKind::Capacity,
                PdfError::Serialization(_) => ErrorKind::Primitive,
                PdfError::Signer(e) => crypto_kind(e),
            },
        }
    }

    /// Last pipeline state reached before the failure. Each variant can
    /// only arise at one point of `DocumentSigner::sign_document`, so the
    /// variant alone determines it.
    pub fn stage(&self) -> SigningState {
        match self {
            SigningError::InvalidConfig(_) | SigningError::Crypto(_) => SigningState::Unsigned,
            SigningError::Pdf(e) => match e {
                PdfError::MalformedDocument(_)
                | PdfError::InvalidOptions(_)
                | PdfError::Serialization(_) => SigningState::Unsigned,
                PdfError::PlaceholderResolution(_) => SigningState::PlaceholderInjected,
                PdfError::SignatureTooLarge { .. } | PdfError::Signer(_) => {
                    SigningState::ByteRangeResolved
                }
            },
        }
    }
}

fn crypto_kind(error: &CryptoError) -> ErrorKind {
    match error {
        CryptoError::EmptyCertificateBundle
        | CryptoError::Certificate(_)
        | CryptoError::PrivateKey(_) => ErrorKind::Input,
        CryptoError::KeyGeneration(_) | CryptoError::KeyEncoding(_) | CryptoError::Signing(_) => {
            ErrorKind::Primitive
        }
    }
}

pub type Result<T> = std::result::Result<T, SigningError>;
