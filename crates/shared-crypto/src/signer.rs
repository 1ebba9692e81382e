//! Detached signing seam shared by the PDF pipeline

use crate::asn1::{OID_SHA256, OID_SHA512};
use crate::error::{CryptoError, Result};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Digest algorithms usable for document digests and RSA signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Digest the concatenation of `parts` without copying them together
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
            DigestAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.digest_parts(&[data])
    }

    /// Length of the digest in bytes
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// DER content bytes of the algorithm OID
    pub fn oid(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha256 => OID_SHA256,
            DigestAlgorithm::Sha512 => OID_SHA512,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    fn pkcs1v15(&self) -> Pkcs1v15Sign {
        match self {
            DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(format!("Unsupported digest algorithm: {}", other)),
        }
    }
}

/// Raw signature bytes plus the digest algorithm that produced them
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureValue {
    pub bytes: Vec<u8>,
    pub digest_algorithm: DigestAlgorithm,
}

impl SignatureValue {
    pub fn new(bytes: Vec<u8>, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            bytes,
            digest_algorithm,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Uppercase hex, the form embedded in a PDF `/Contents` string
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

impl fmt::Debug for SignatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureValue")
            .field("len", &self.bytes.len())
            .field("digest_algorithm", &self.digest_algorithm)
            .finish()
    }
}

/// Anything that can turn a content digest into a detached CMS/PKCS#7 blob
pub trait DetachedSigner {
    /// Sign `content_digest`, which was computed with `algorithm` over the
    /// external content, and return a DER-encoded `ContentInfo`.
    fn sign_detached(
        &self,
        content_digest: &[u8],
        algorithm: DigestAlgorithm,
    ) -> Result<SignatureValue>;
}

impl<T: DetachedSigner + ?Sized> DetachedSigner for &T {
    fn sign_detached(
        &self,
        content_digest: &[u8],
        algorithm: DigestAlgorithm,
    ) -> Result<SignatureValue> {
        (**self).sign_detached(content_digest, algorithm)
    }
}

/// RSA PKCS#1 v1.5 signature over `data`, hashed with `algorithm`
pub fn rsa_sign(
    key: &RsaPrivateKey,
    algorithm: DigestAlgorithm,
    data: &[u8],
) -> Result<Vec<u8>> {
    let hashed = algorithm.digest(data);
    key.sign(algorithm.pkcs1v15(), &hashed)
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

/// Check an RSA PKCS#1 v1.5 signature produced by [`rsa_sign`]
pub fn rsa_verify(
    key: &rsa::RsaPublicKey,
    algorithm: DigestAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> bool {
    let hashed = algorithm.digest(data);
    key.verify(algorithm.pkcs1v15(), &hashed, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_digest_parts_matches_contiguous() {
        for algorithm in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            let split = algorithm.digest_parts(&[b"hello ", b"world"]);
            let whole = algorithm.digest(b"hello world");
            assert_eq!(split, whole);
            assert_eq!(whole.len(), algorithm.output_len());
        }
    }

    #[test]
    fn test_parse_digest_algorithm() {
        assert_eq!("SHA-256".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha256));
        assert_eq!("sha512".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha512));
        assert!("md5".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn test_signature_value_hex_is_uppercase() {
        let value = SignatureValue::new(vec![0xAB, 0x01], DigestAlgorithm::Sha256);
        assert_eq!(value.to_hex(), "AB01");
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_signature_value_debug_hides_bytes() {
        let value = SignatureValue::new(vec![0xDE, 0xAD], DigestAlgorithm::Sha256);
        let rendered = format!("{:?}", value);
        assert!(!rendered.contains("222"));
        assert!(rendered.contains("len: 2"));
    }
}
