use shared_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Malformed PDF: {0}")]
    MalformedDocument(String),

    #[error("Invalid placeholder options: {0}")]
    InvalidOptions(String),

    #[error("Could not resolve signature placeholder: {0}")]
    PlaceholderResolution(String),

    #[error("Signature needs {required} hex characters but the placeholder holds {capacity}")]
    SignatureTooLarge { required: usize, capacity: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Signer(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, PdfError>;
