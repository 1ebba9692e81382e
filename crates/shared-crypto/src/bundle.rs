//! Caller-supplied certificate bundles
//!
//! A bundle is a PEM container holding exactly one RSA private key and a
//! certificate chain, signer certificate first. Supported key blocks:
//! - `PRIVATE KEY` (PKCS#8)
//! - `ENCRYPTED PRIVATE KEY` (PKCS#8, needs a passphrase)
//! - `RSA PRIVATE KEY` (PKCS#1)

use crate::cms::{build_signed_data, SignedDataRequest};
use crate::error::{CryptoError, Result};
use crate::signer::{DetachedSigner, DigestAlgorithm, SignatureValue};
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

/// Signing key plus certificate chain used for the embedded signature
pub struct CertificateBundle {
    private_key: RsaPrivateKey,
    chain: Vec<Certificate>,
    chain_der: Vec<Vec<u8>>,
}

impl CertificateBundle {
    /// Parse a PEM bundle. `passphrase` is only consulted for an
    /// `ENCRYPTED PRIVATE KEY` block.
    pub fn from_pem(bundle: &[u8], passphrase: Option<&str>) -> Result<Self> {
        if bundle.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CryptoError::EmptyCertificateBundle);
        }

        let text = std::str::from_utf8(bundle)
            .map_err(|_| CryptoError::Certificate("Bundle is not PEM text".to_string()))?;

        let mut private_key = None;
        let mut chain = Vec::new();

        for block in pem_blocks(text)? {
            match block.label {
                "CERTIFICATE" => {
                    let cert = Certificate::from_pem(block.text)
                        .map_err(|e| CryptoError::Certificate(e.to_string()))?;
                    chain.push(cert);
                }
                "PRIVATE KEY" | "ENCRYPTED PRIVATE KEY" | "RSA PRIVATE KEY" => {
                    if private_key.is_some() {
                        return Err(CryptoError::PrivateKey(
                            "Bundle contains more than one private key".to_string(),
                        ));
                    }
                    private_key = Some(decode_private_key(&block, passphrase)?);
                }
                other => {
                    tracing::debug!(label = other, "Ignoring unrelated PEM block in bundle");
                }
            }
        }

        let private_key = private_key.ok_or_else(|| {
            CryptoError::PrivateKey("Bundle contains no private key".to_string())
        })?;

        Self::from_parts(private_key, chain)
    }

    /// Assemble a bundle from an already decoded key and chain
    pub fn from_parts(private_key: RsaPrivateKey, chain: Vec<Certificate>) -> Result<Self> {
        if chain.is_empty() {
            return Err(CryptoError::Certificate(
                "Bundle contains no certificate".to_string(),
            ));
        }

        let chain_der = chain
            .iter()
            .map(|cert| {
                cert.to_der()
                    .map_err(|e| CryptoError::Certificate(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            private_key,
            chain,
            chain_der,
        })
    }

    /// The certificate whose key produces the signature
    pub fn signer_certificate(&self) -> &Certificate {
        &self.chain[0]
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Subject of the signer certificate in RFC 4514 form
    pub fn subject_name(&self) -> String {
        self.signer_certificate().tbs_certificate.subject.to_string()
    }

    /// Total DER size of the embedded chain, the dominant term in the
    /// size of a produced signature.
    pub fn chain_der_len(&self) -> usize {
        self.chain_der.iter().map(Vec::len).sum()
    }
}

impl DetachedSigner for CertificateBundle {
    fn sign_detached(
        &self,
        content_digest: &[u8],
        algorithm: DigestAlgorithm,
    ) -> Result<SignatureValue> {
        let bytes = build_signed_data(&SignedDataRequest {
            content_digest,
            algorithm,
            signer: self.signer_certificate(),
            chain: &self.chain_der,
            private_key: &self.private_key,
            signing_time: Utc::now(),
        })?;

        tracing::debug!(
            signature_len = bytes.len(),
            chain_len = self.chain.len(),
            "Built detached CMS signature"
        );

        Ok(SignatureValue::new(bytes, algorithm))
    }
}

struct PemBlock<'a> {
    label: &'a str,
    text: &'a str,
}

/// Split a PEM container into its `BEGIN`/`END` blocks
fn pem_blocks(text: &str) -> Result<Vec<PemBlock<'_>>> {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(BEGIN) {
        let start = cursor + offset;
        let label_start = start + BEGIN.len();
        let label_len = text[label_start..].find(DASHES).ok_or_else(|| {
            CryptoError::Certificate("Unterminated PEM header".to_string())
        })?;
        let label = &text[label_start..label_start + label_len];

        let end_marker = format!("-----END {}-----", label);
        let end = text[label_start..]
            .find(&end_marker)
            .map(|pos| label_start + pos + end_marker.len())
            .ok_or_else(|| {
                CryptoError::Certificate(format!("Missing END marker for {}", label))
            })?;

        blocks.push(PemBlock {
            label,
            text: &text[start..end],
        });
        cursor = end;
    }

    if blocks.is_empty() {
        return Err(CryptoError::Certificate(
            "No PEM blocks found in bundle".to_string(),
        ));
    }

    Ok(blocks)
}

fn decode_private_key(block: &PemBlock<'_>, passphrase: Option<&str>) -> Result<RsaPrivateKey> {
    let decoded = match block.label {
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase = passphrase.ok_or_else(|| {
                CryptoError::PrivateKey("Encrypted private key requires a passphrase".to_string())
            })?;
            RsaPrivateKey::from_pkcs8_encrypted_pem(block.text, passphrase)
                .map_err(|e| e.to_string())
        }
        "RSA PRIVATE KEY" => {
            RsaPrivateKey::from_pkcs1_pem(block.text).map_err(|e| e.to_string())
        }
        _ => RsaPrivateKey::from_pkcs8_pem(block.text).map_err(|e| e.to_string()),
    };

    decoded.map_err(CryptoError::PrivateKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::encrypt_private_key_pem;
    use crate::testing;
    use pkcs8::{EncodePrivateKey, LineEnding};

    #[test]
    fn test_empty_bundle_rejected() {
        assert!(matches!(
            CertificateBundle::from_pem(b"", None),
            Err(CryptoError::EmptyCertificateBundle)
        ));
        assert!(matches!(
            CertificateBundle::from_pem(b"  \n", None),
            Err(CryptoError::EmptyCertificateBundle)
        ));
    }

    #[test]
    fn test_parses_self_signed_bundle() {
        let pem = testing::self_signed_bundle_pem("Bundle Signer");
        let bundle = CertificateBundle::from_pem(pem.as_bytes(), None).unwrap();

        assert_eq!(bundle.chain_len(), 1);
        assert_eq!(bundle.subject_name(), "CN=Bundle Signer");
        assert!(bundle.chain_der_len() > 0);
    }

    #[test]
    fn test_missing_key_rejected() {
        let cert_pem = testing::certificate_pem(&testing::self_signed_certificate(
            testing::test_key(),
            "No Key",
        ));
        let result = CertificateBundle::from_pem(cert_pem.as_bytes(), None);
        assert!(matches!(result, Err(CryptoError::PrivateKey(_))));
    }

    #[test]
    fn test_missing_certificate_rejected() {
        let key_pem = testing::test_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let result = CertificateBundle::from_pem(key_pem.as_bytes(), None);
        assert!(matches!(result, Err(CryptoError::Certificate(_))));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let key_pem = testing::test_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let pem = format!(
            "{}{}",
            key_pem.as_str(),
            testing::self_signed_bundle_pem("Twice")
        );
        let result = CertificateBundle::from_pem(pem.as_bytes(), None);
        assert!(matches!(result, Err(CryptoError::PrivateKey(_))));
    }

    #[test]
    fn test_encrypted_key_needs_passphrase() {
        let key = testing::test_key();
        let encrypted = encrypt_private_key_pem(key, "s3cret", 64).unwrap();
        let cert_pem = testing::certificate_pem(&testing::self_signed_certificate(key, "Locked"));
        let pem = format!("{}{}", encrypted, cert_pem);

        assert!(matches!(
            CertificateBundle::from_pem(pem.as_bytes(), None),
            Err(CryptoError::PrivateKey(_))
        ));
        assert!(CertificateBundle::from_pem(pem.as_bytes(), Some("s3cret")).is_ok());
    }

    #[test]
    fn test_non_pem_rejected() {
        let result = CertificateBundle::from_pem(b"not a bundle at all", None);
        assert!(matches!(result, Err(CryptoError::Certificate(_))));
    }

    #[test]
    fn test_pem_blocks_reads_labels_in_order() {
        let text = "junk\n-----BEGIN A-----\nAAAA\n-----END A-----\n-----BEGIN B C-----\nBB\n-----END B C-----\n";
        let blocks = pem_blocks(text).unwrap();
        let labels: Vec<&str> = blocks.iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["A", "B C"]);
        assert!(blocks[0].text.ends_with("-----END A-----"));
    }

    #[test]
    fn test_signature_covers_digest() {
        let bundle = testing::self_signed_bundle("Detached");
        let digest = DigestAlgorithm::Sha256.digest(b"pdf bytes");
        let value = bundle
            .sign_detached(&digest, DigestAlgorithm::Sha256)
            .unwrap();

        assert_eq!(value.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(value.bytes[0], 0x30);
        assert!(value.bytes.windows(32).any(|w| w == digest.as_slice()));
    }
}
