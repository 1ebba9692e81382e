//! CMS (Cryptographic Message Syntax) construction for PDF signatures
//!
//! Builds a detached PKCS#7 SignedData over an externally computed
//! content digest. The signer info carries these signed attributes:
//! - content-type
//! - signing-time
//! - message-digest
//! - signing-certificate-v2 (ESS, required for PAdES-B)
//!
//! The RSA signature covers the DER `SET OF` encoding of those attributes,
//! not the content itself.

use crate::asn1::*;
use crate::error::{CryptoError, Result};
use crate::signer::{rsa_sign, DigestAlgorithm};
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use x509_cert::der::Encode;
use x509_cert::Certificate;

/// Inputs for a single detached SignedData
pub struct SignedDataRequest<'a> {
    /// Digest of the external content, computed with `algorithm`
    pub content_digest: &'a [u8],
    pub algorithm: DigestAlgorithm,
    /// Signer certificate, used for the signer identifier
    pub signer: &'a Certificate,
    /// DER certificates to embed, signer first
    pub chain: &'a [Vec<u8>],
    pub private_key: &'a RsaPrivateKey,
    pub signing_time: DateTime<Utc>,
}

/// Build a DER-encoded `ContentInfo` wrapping a detached `SignedData`
pub fn build_signed_data(request: &SignedDataRequest<'_>) -> Result<Vec<u8>> {
    if request.content_digest.len() != request.algorithm.output_len() {
        return Err(CryptoError::Signing(format!(
            "Digest is {} bytes, {} produces {}",
            request.content_digest.len(),
            request.algorithm,
            request.algorithm.output_len()
        )));
    }

    let signer_cert_der = request.chain.first().ok_or_else(|| {
        CryptoError::Certificate("Certificate chain is empty".to_string())
    })?;

    // Step 1: Signed attributes, sorted for DER
    let attributes = build_signed_attributes(
        request.content_digest,
        &request.signing_time,
        signer_cert_der,
    );

    // Step 2: Sign the attributes re-tagged as a SET OF
    let signature = rsa_sign(request.private_key, request.algorithm, &build_set(&attributes))?;

    // Step 3: SignerInfo
    let sid = issuer_and_serial_number(request.signer)?;
    let signer_info = build_signer_info(&sid, request.algorithm, &attributes, &signature);

    // Step 4: SignedData and ContentInfo
    let signed_data = build_signed_data_content(request.algorithm, request.chain, &signer_info);
    Ok(build_content_info(&signed_data))
}

/// Concatenated encodings of the signed attributes, in DER order
pub fn build_signed_attributes(
    content_digest: &[u8],
    signing_time: &DateTime<Utc>,
    signer_cert_der: &[u8],
) -> Vec<u8> {
    let attributes = vec![
        build_attribute(OID_CONTENT_TYPE, &build_oid(OID_DATA)),
        build_attribute(OID_SIGNING_TIME, &build_utc_time(signing_time)),
        build_attribute(OID_MESSAGE_DIGEST, &build_octet_string(content_digest)),
        build_signing_certificate_v2(signer_cert_der),
    ];
    sorted_concat(&attributes)
}

/// IssuerAndSerialNumber for the signer identifier
pub fn issuer_and_serial_number(cert: &Certificate) -> Result<Vec<u8>> {
    let issuer = cert
        .tbs_certificate
        .issuer
        .to_der()
        .map_err(|e| CryptoError::Certificate(e.to_string()))?;
    let serial = cert
        .tbs_certificate
        .serial_number
        .to_der()
        .map_err(|e| CryptoError::Certificate(e.to_string()))?;
    Ok(build_sequence(&[&issuer, &serial]))
}

/// SigningCertificateV2 ::= SEQUENCE { certs SEQUENCE OF ESSCertIDv2 }
///
/// The hash algorithm is SHA-256, the DEFAULT, so it is omitted.
fn build_signing_certificate_v2(certificate: &[u8]) -> Vec<u8> {
    let cert_hash: [u8; 32] = Sha256::digest(certificate).into();

    let ess_cert_id = build_sequence(&[&build_octet_string(&cert_hash)]);
    let certs = build_sequence(&[&ess_cert_id]);
    let signing_cert = build_sequence(&[&certs]);

    build_attribute(OID_SIGNING_CERTIFICATE_V2, &signing_cert)
}

/// Build a single attribute (SEQUENCE of OID and SET of values)
fn build_attribute(oid: &[u8], value: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    let value_set = build_set(value);
    build_sequence(&[&oid_encoded, &value_set])
}

fn build_signer_info(
    sid: &[u8],
    algorithm: DigestAlgorithm,
    attributes: &[u8],
    signature: &[u8],
) -> Vec<u8> {
    let mut content = Vec::new();

    // Version (1 for issuerAndSerialNumber)
    content.extend(build_integer(&[1]));
    content.extend_from_slice(sid);
    content.extend(build_algorithm_identifier(algorithm.oid()));

    // Signed attributes, [0] IMPLICIT
    content.extend(build_context_specific(0, attributes));

    content.extend(build_algorithm_identifier(OID_RSA_ENCRYPTION));
    content.extend(build_octet_string(signature));

    build_sequence(&[&content])
}

fn build_signed_data_content(
    algorithm: DigestAlgorithm,
    chain: &[Vec<u8>],
    signer_info: &[u8],
) -> Vec<u8> {
    let mut content = Vec::new();

    content.extend(build_integer(&[1]));
    content.extend(build_set(&build_algorithm_identifier(algorithm.oid())));

    // EncapsulatedContentInfo without eContent: detached
    content.extend(build_sequence(&[&build_oid(OID_DATA)]));

    // Certificates [0] IMPLICIT SET OF Certificate
    content.extend(build_context_specific(0, &sorted_concat(chain)));

    content.extend(build_set(signer_info));

    build_sequence(&[&content])
}

fn build_content_info(signed_data: &[u8]) -> Vec<u8> {
    let oid = build_oid(OID_SIGNED_DATA);
    let content = build_context_specific(0, signed_data);
    build_sequence(&[&oid, &content])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::rsa_verify;
    use crate::testing;
    use chrono::TimeZone;
    use x509_cert::der::Decode;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// Walk ContentInfo -> SignedData -> SignerInfo and return its fields
    fn signer_info_fields(cms: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let (_, content_info, _) = read_tlv(cms).unwrap();
        let (_, _oid, rest) = read_tlv(content_info).unwrap();
        let (_, explicit, _) = read_tlv(rest).unwrap();
        let (_, signed_data, _) = read_tlv(explicit).unwrap();

        let mut cursor = signed_data;
        let mut last = (0u8, &[][..]);
        while !cursor.is_empty() {
            let (tag, body, rest) = read_tlv(cursor).unwrap();
            last = (tag, body);
            cursor = rest;
        }
        assert_eq!(last.0, TAG_SET);

        let (_, signer_info, _) = read_tlv(last.1).unwrap();
        let mut fields = Vec::new();
        let mut cursor = signer_info;
        while !cursor.is_empty() {
            let (tag, body, rest) = read_tlv(cursor).unwrap();
            fields.push((tag, body.to_vec()));
            cursor = rest;
        }
        fields
    }

    #[test]
    fn test_signed_data_signature_verifies() {
        let key = testing::test_key();
        let cert_der = testing::self_signed_certificate(key, "CMS Test");
        let cert = Certificate::from_der(&cert_der).unwrap();
        let chain = vec![cert_der];
        let digest = DigestAlgorithm::Sha256.digest(b"external content");

        let cms = build_signed_data(&SignedDataRequest {
            content_digest: &digest,
            algorithm: DigestAlgorithm::Sha256,
            signer: &cert,
            chain: &chain,
            private_key: key,
            signing_time: fixed_time(),
        })
        .unwrap();

        let fields = signer_info_fields(&cms);
        // version, sid, digestAlgorithm, [0] attrs, signatureAlgorithm, signature
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[3].0, 0xA0);
        assert_eq!(fields[5].0, TAG_OCTET_STRING);

        let signed_attrs = build_set(&fields[3].1);
        assert!(rsa_verify(
            &key.to_public_key(),
            DigestAlgorithm::Sha256,
            &signed_attrs,
            &fields[5].1
        ));

        // The message digest attribute carries the content digest
        assert!(fields[3].1.windows(digest.len()).any(|w| w == digest.as_slice()));
    }

    #[test]
    fn test_rejects_mismatched_digest_length() {
        let key = testing::test_key();
        let cert_der = testing::self_signed_certificate(key, "CMS Test");
        let cert = Certificate::from_der(&cert_der).unwrap();
        let chain = vec![cert_der];

        let result = build_signed_data(&SignedDataRequest {
            content_digest: &[0u8; 20],
            algorithm: DigestAlgorithm::Sha256,
            signer: &cert,
            chain: &chain,
            private_key: key,
            signing_time: fixed_time(),
        });
        assert!(matches!(result, Err(CryptoError::Signing(_))));
    }

    #[test]
    fn test_signed_attributes_are_sorted() {
        let attrs = build_signed_attributes(&[7u8; 32], &fixed_time(), b"cert");

        let mut encodings = Vec::new();
        let mut cursor = attrs.as_slice();
        while !cursor.is_empty() {
            let (_, body, rest) = read_tlv(cursor).unwrap();
            let header = cursor.len() - rest.len() - body.len();
            encodings.push(cursor[..header + body.len()].to_vec());
            cursor = rest;
        }

        assert_eq!(encodings.len(), 4);
        let mut sorted = encodings.clone();
        sorted.sort();
        assert_eq!(encodings, sorted);
    }
}
