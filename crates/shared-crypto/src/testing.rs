//! Self-signed certificate bundles for tests
//!
//! Certificates are X.509 v1, signed with SHA-256/RSA by a 2048-bit key
//! that is generated once per process.

use crate::asn1::*;
use crate::bundle::CertificateBundle;
use crate::signer::{rsa_sign, DigestAlgorithm};
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rand_core::OsRng;
use rsa::RsaPrivateKey;
use std::sync::OnceLock;
use x509_cert::der::{Decode, EncodePem};
use x509_cert::Certificate;

/// Shared 2048-bit key; generating one per test is too slow
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation"))
}

/// DER certificate for `key` with subject and issuer `CN=common_name`
pub fn self_signed_certificate(key: &RsaPrivateKey, common_name: &str) -> Vec<u8> {
    let name = build_name(common_name);
    let spki = key
        .to_public_key()
        .to_public_key_der()
        .expect("SPKI encoding");
    let signature_alg = build_algorithm_identifier(OID_SHA256_WITH_RSA);

    let not_before = build_tlv(TAG_UTC_TIME, b"240101000000Z");
    let not_after = build_tlv(TAG_UTC_TIME, b"491231235959Z");
    let validity = build_sequence(&[&not_before, &not_after]);

    // v1: version field omitted
    let tbs = build_sequence(&[
        &build_integer(&[0x01, 0x23, 0x45, 0x67]),
        &signature_alg,
        &name,
        &validity,
        &name,
        spki.as_bytes(),
    ]);

    let signature = rsa_sign(key, DigestAlgorithm::Sha256, &tbs).expect("certificate signature");
    build_sequence(&[&tbs, &signature_alg, &build_bit_string(&signature)])
}

/// PEM-armour a DER certificate
pub fn certificate_pem(der: &[u8]) -> String {
    Certificate::from_der(der)
        .and_then(|cert| cert.to_pem(LineEnding::LF))
        .expect("certificate PEM encoding")
}

/// Unencrypted PKCS#8 key followed by its self-signed certificate
pub fn self_signed_bundle_pem(common_name: &str) -> String {
    let key = test_key();
    let key_pem = key.to_pkcs8_pem(LineEnding::LF).expect("PKCS#8 encoding");
    let cert_pem = certificate_pem(&self_signed_certificate(key, common_name));
    format!("{}{}", key_pem.as_str(), cert_pem)
}

pub fn self_signed_bundle(common_name: &str) -> CertificateBundle {
    CertificateBundle::from_pem(self_signed_bundle_pem(common_name).as_bytes(), None)
        .expect("self-signed bundle")
}
