//! Minimal ASN.1 DER encoding helpers
//!
//! Only the handful of universal types needed for CMS SignedData and
//! X.509 structures are covered. Every builder returns a complete TLV.

use chrono::{DateTime, Utc};

/// OID for SHA-256: 2.16.840.1.101.3.4.2.1
pub const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// OID for SHA-512: 2.16.840.1.101.3.4.2.3
pub const OID_SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

/// OID for rsaEncryption: 1.2.840.113549.1.1.1
pub const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// OID for sha256WithRSAEncryption: 1.2.840.113549.1.1.11
pub const OID_SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];

/// OID for id-data (PKCS#7): 1.2.840.113549.1.7.1
pub const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];

/// OID for id-signedData (PKCS#7): 1.2.840.113549.1.7.2
pub const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];

/// OID for content-type attribute: 1.2.840.113549.1.9.3
pub const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];

/// OID for message-digest attribute: 1.2.840.113549.1.9.4
pub const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// OID for signing-time attribute: 1.2.840.113549.1.9.5
pub const OID_SIGNING_TIME: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05];

/// OID for id-aa-signingCertificateV2: 1.2.840.113549.1.9.16.2.47
pub const OID_SIGNING_CERTIFICATE_V2: &[u8] = &[
    0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x02, 0x2F,
];

/// OID for the commonName attribute type: 2.5.4.3
pub const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTF8_STRING: u8 = 0x0C;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

pub fn build_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len() + 6);
    result.push(tag);
    result.extend(encode_length(content.len()));
    result.extend_from_slice(content);
    result
}

/// DER definite length: short form below 128, otherwise the minimal
/// big-endian byte count prefixed with `0x80 | count`.
fn encode_length(len: usize) -> Vec<u8> {
    if len < 128 {
        return vec![len as u8];
    }

    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];

    let mut encoded = Vec::with_capacity(significant.len() + 1);
    encoded.push(0x80 | significant.len() as u8);
    encoded.extend_from_slice(significant);
    encoded
}

pub fn build_sequence(items: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    build_tlv(TAG_SEQUENCE, &content)
}

pub fn build_set(content: &[u8]) -> Vec<u8> {
    build_tlv(TAG_SET, content)
}

/// Build a DER `SET OF`, whose elements must appear in ascending
/// order of their encodings.
pub fn build_set_of(items: &[Vec<u8>]) -> Vec<u8> {
    build_set(&sorted_concat(items))
}

/// Concatenate encodings in DER `SET OF` order.
pub fn sorted_concat(items: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted: Vec<&Vec<u8>> = items.iter().collect();
    sorted.sort();
    sorted.into_iter().flatten().copied().collect()
}

pub fn build_oid(oid_bytes: &[u8]) -> Vec<u8> {
    build_tlv(TAG_OID, oid_bytes)
}

/// Encode an unsigned big-endian integer, stripping redundant leading
/// zeros and adding one back when the high bit is set.
pub fn build_integer(value: &[u8]) -> Vec<u8> {
    let skip = value
        .iter()
        .take_while(|&&b| b == 0)
        .count()
        .min(value.len().saturating_sub(1));
    let value = &value[skip..];

    if value.is_empty() {
        return build_tlv(TAG_INTEGER, &[0]);
    }

    if value[0] & 0x80 != 0 {
        let mut padded = vec![0];
        padded.extend_from_slice(value);
        build_tlv(TAG_INTEGER, &padded)
    } else {
        build_tlv(TAG_INTEGER, value)
    }
}

pub fn build_octet_string(content: &[u8]) -> Vec<u8> {
    build_tlv(TAG_OCTET_STRING, content)
}

pub fn build_bit_string(content: &[u8]) -> Vec<u8> {
    let mut bs = Vec::with_capacity(content.len() + 1);
    bs.push(0); // No unused bits
    bs.extend_from_slice(content);
    build_tlv(TAG_BIT_STRING, &bs)
}

pub fn build_null() -> Vec<u8> {
    vec![TAG_NULL, 0x00]
}

pub fn build_utf8_string(s: &str) -> Vec<u8> {
    build_tlv(TAG_UTF8_STRING, s.as_bytes())
}

/// UTCTime in `YYMMDDHHMMSSZ` form
pub fn build_utc_time(time: &DateTime<Utc>) -> Vec<u8> {
    let formatted = time.format("%y%m%d%H%M%SZ").to_string();
    build_tlv(TAG_UTC_TIME, formatted.as_bytes())
}

/// Constructed context-specific tag `[n]`
pub fn build_context_specific(tag: u8, content: &[u8]) -> Vec<u8> {
    build_tlv(0xA0 | tag, content)
}

/// AlgorithmIdentifier with NULL parameters
pub fn build_algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    build_sequence(&[&oid_encoded, &build_null()])
}

/// Name consisting of a single commonName RDN
pub fn build_name(common_name: &str) -> Vec<u8> {
    let cn_oid = build_oid(OID_COMMON_NAME);
    let cn_value = build_utf8_string(common_name);
    let attr = build_sequence(&[&cn_oid, &cn_value]);
    let rdn = build_set(&attr);
    build_sequence(&[&rdn])
}

/// Split the first TLV off `data`, returning `(tag, content, remaining)`.
pub fn read_tlv(data: &[u8]) -> Result<(u8, &[u8], &[u8]), String> {
    let (&tag, rest) = data.split_first().ok_or("Empty TLV data")?;
    let (&first, rest) = rest.split_first().ok_or("No length byte")?;

    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() || rest.len() < count {
            return Err(format!("Unsupported length encoding: 0x{:02X}", first));
        }
        let len = rest[..count]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        (len, &rest[count..])
    };

    if rest.len() < len {
        return Err(format!(
            "TLV data too short: need {} bytes, have {}",
            len,
            rest.len()
        ));
    }

    Ok((tag, &rest[..len], &rest[len..]))
}
