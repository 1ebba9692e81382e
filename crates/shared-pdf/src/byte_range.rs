//! ByteRange resolution and in-place signature embedding
//!
//! Works on the serialized bytes of a document that already carries a
//! placeholder. The output always has exactly the input's length: only the
//! `ByteRange` array and the `Contents` hex digits are overwritten.

use crate::error::{PdfError, Result};
use crate::placeholder::BYTE_RANGE_SENTINEL;
use shared_crypto::{DetachedSigner, DigestAlgorithm, SignatureValue};
use std::fmt;
use std::ops::Range;

const BYTE_RANGE_KEY: &[u8] = b"/ByteRange";
const CONTENTS_KEY: &[u8] = b"/Contents";
const END_OBJECT: &[u8] = b"endobj";

/// Filler written after the signature inside `Contents`
const PAD: u8 = b'0';

/// The four integers of a resolved `ByteRange`: two `(offset, length)`
/// pairs covering everything except the `Contents` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange(pub [usize; 4]);

impl ByteRange {
    /// Range covering a file of `total_len` bytes with the span
    /// `contents_start..contents_end` excluded
    pub fn new(contents_start: usize, contents_end: usize, total_len: usize) -> Self {
        Self([
            0,
            contents_start,
            contents_end,
            total_len.saturating_sub(contents_end),
        ])
    }

    pub fn contents_start(&self) -> usize {
        self.0[0].saturating_add(self.0[1])
    }

    pub fn contents_end(&self) -> usize {
        self.0[2]
    }

    /// File length this range claims to cover
    pub fn total_len(&self) -> usize {
        self.0[2].saturating_add(self.0[3])
    }

    /// The two covered spans, in file order. Values read from a file can
    /// be anything, so a span whose end overflows is an error.
    pub fn covered(&self) -> Result<[Range<usize>; 2]> {
        let span = |offset: usize, len: usize| {
            offset.checked_add(len).map(|end| offset..end).ok_or_else(|| {
                PdfError::PlaceholderResolution(format!("ByteRange {} overflows", self))
            })
        };
        Ok([span(self.0[0], self.0[1])?, span(self.0[2], self.0[3])?])
    }

    /// PDF array syntax, e.g. `[0 840 17226 512]`
    pub fn to_pdf_array(&self) -> String {
        format!("[{} {} {} {}]", self.0[0], self.0[1], self.0[2], self.0[3])
    }

    /// Read the last resolved `ByteRange` array out of serialized bytes
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let mut search_end = bytes.len();

        while let Some(key) = find_last(&bytes[..search_end], BYTE_RANGE_KEY) {
            if let Some(array) = array_after(bytes, key + BYTE_RANGE_KEY.len()) {
                if let Some(values) = parse_integers(&bytes[array.start + 1..array.end - 1]) {
                    return Ok(Self(values));
                }
            }
            search_end = key;
        }

        Err(PdfError::PlaceholderResolution(
            "No resolved ByteRange found".to_string(),
        ))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pdf_array())
    }
}

/// Where an unresolved placeholder sits in serialized bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePlaceholder {
    /// The `[...]` array after `/ByteRange`, brackets included
    pub byte_range: Range<usize>,
    /// The `<...>` string after `/Contents`, delimiters included
    pub contents: Range<usize>,
}

impl SignaturePlaceholder {
    /// Hex digits available for the signature
    pub fn hex_capacity(&self) -> usize {
        self.contents.len() - 2
    }

    /// Signature bytes the placeholder can hold
    pub fn capacity(&self) -> usize {
        self.hex_capacity() / 2
    }

    /// Hex digits only, without the angle brackets
    pub fn hex_digits(&self) -> Range<usize> {
        self.contents.start + 1..self.contents.end - 1
    }

    pub fn byte_range_for(&self, total_len: usize) -> ByteRange {
        ByteRange::new(self.contents.start, self.contents.end, total_len)
    }
}

/// Result of embedding a signature
#[derive(Debug, Clone)]
pub struct SignedPdf {
    pub bytes: Vec<u8>,
    pub byte_range: ByteRange,
    /// The embedded signature, before padding
    pub signature: SignatureValue,
}

/// Find the one unresolved signature placeholder in `bytes`.
///
/// Zero or several placeholders are a
/// [`PdfError::PlaceholderResolution`].
pub fn locate_placeholder(bytes: &[u8]) -> Result<SignaturePlaceholder> {
    let mut arrays = find_all(bytes, BYTE_RANGE_KEY).filter_map(|key| {
        array_after(bytes, key + BYTE_RANGE_KEY.len())
            .filter(|array| is_sentinel_array(&bytes[array.start + 1..array.end - 1]))
    });

    let byte_range = arrays.next().ok_or_else(|| {
        PdfError::PlaceholderResolution("No unresolved ByteRange placeholder".to_string())
    })?;
    if arrays.next().is_some() {
        return Err(PdfError::PlaceholderResolution(
            "More than one unresolved ByteRange placeholder".to_string(),
        ));
    }

    let object = enclosing_object(bytes, byte_range.start);
    let mut strings = find_all(&bytes[object.clone()], CONTENTS_KEY)
        .filter_map(|key| zero_hex_string_after(bytes, object.start + key + CONTENTS_KEY.len()));

    let contents = strings.next().ok_or_else(|| {
        PdfError::PlaceholderResolution(
            "Signature dictionary has no zero-filled Contents".to_string(),
        )
    })?;
    if strings.next().is_some() {
        return Err(PdfError::PlaceholderResolution(
            "Signature dictionary has more than one Contents".to_string(),
        ));
    }

    Ok(SignaturePlaceholder {
        byte_range,
        contents,
    })
}

/// Injected bytes with the real `ByteRange` written and the `Contents`
/// field still zero-filled
#[derive(Debug, Clone)]
pub struct ResolvedPlaceholder {
    bytes: Vec<u8>,
    placeholder: SignaturePlaceholder,
    byte_range: ByteRange,
}

impl ResolvedPlaceholder {
    pub fn byte_range(&self) -> ByteRange {
        self.byte_range
    }

    pub fn placeholder(&self) -> &SignaturePlaceholder {
        &self.placeholder
    }

    /// Digest to hand to the signing primitive
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        signed_ranges_digest(&self.bytes, &self.byte_range, algorithm)
    }

    /// Write `signature` into `Contents`, padding with `0` digits.
    ///
    /// A signature whose hex form does not fit fails with
    /// [`PdfError::SignatureTooLarge`] and the buffer is dropped; it is
    /// never truncated.
    pub fn embed(self, signature: SignatureValue) -> Result<SignedPdf> {
        let Self {
            mut bytes,
            placeholder,
            byte_range,
        } = self;

        let hex = signature.to_hex();
        if hex.len() > placeholder.hex_capacity() {
            return Err(PdfError::SignatureTooLarge {
                required: hex.len(),
                capacity: placeholder.hex_capacity(),
            });
        }

        let field = &mut bytes[placeholder.hex_digits()];
        field[..hex.len()].copy_from_slice(hex.as_bytes());
        field[hex.len()..].fill(PAD);

        tracing::debug!(
            byte_range = %byte_range,
            signature_len = signature.len(),
            capacity = placeholder.capacity(),
            "Embedded signature"
        );

        Ok(SignedPdf {
            bytes,
            byte_range,
            signature,
        })
    }
}

/// Locate the placeholder and overwrite its sentinels with the real
/// `ByteRange`. The returned bytes are the ones the digest must cover.
pub fn resolve_byte_range(injected: &[u8]) -> Result<ResolvedPlaceholder> {
    let placeholder = locate_placeholder(injected)?;
    let byte_range = placeholder.byte_range_for(injected.len());

    let mut bytes = injected.to_vec();
    write_byte_range(&mut bytes, &placeholder, &byte_range)?;

    tracing::debug!(
        byte_range = %byte_range,
        capacity = placeholder.capacity(),
        "Resolved ByteRange"
    );

    Ok(ResolvedPlaceholder {
        bytes,
        placeholder,
        byte_range,
    })
}

/// Resolve the placeholder, digest the covered bytes, sign them and embed
/// the signature.
///
/// The digest is taken after the real `ByteRange` is written, so it covers
/// the final bytes of every span.
pub fn sign_in_place<S>(
    injected: &[u8],
    signer: &S,
    algorithm: DigestAlgorithm,
) -> Result<SignedPdf>
where
    S: DetachedSigner + ?Sized,
{
    let resolved = resolve_byte_range(injected)?;
    let digest = resolved.digest(algorithm)?;
    let signature = signer.sign_detached(&digest, algorithm)?;
    resolved.embed(signature)
}

/// Digest of the two spans a `ByteRange` covers
pub fn signed_ranges_digest(
    bytes: &[u8],
    byte_range: &ByteRange,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    let [head, tail] = byte_range.covered()?;
    if head.end > tail.start || tail.end > bytes.len() {
        return Err(PdfError::PlaceholderResolution(format!(
            "ByteRange {} does not fit a {} byte document",
            byte_range,
            bytes.len()
        )));
    }

    Ok(algorithm.digest_parts(&[&bytes[head], &bytes[tail]]))
}

/// Overwrite the sentinel array with the real numbers, padding with spaces
/// before the closing bracket.
fn write_byte_range(
    bytes: &mut [u8],
    placeholder: &SignaturePlaceholder,
    byte_range: &ByteRange,
) -> Result<()> {
    let text = byte_range.to_pdf_array();
    let text = text.as_bytes();
    let slot = placeholder.byte_range.clone();

    if text.len() > slot.len() {
        return Err(PdfError::PlaceholderResolution(format!(
            "ByteRange {} needs {} bytes, placeholder has {}",
            byte_range,
            text.len(),
            slot.len()
        )));
    }

    let body = text.len() - 1;
    bytes[slot.start..slot.start + body].copy_from_slice(&text[..body]);
    bytes[slot.start + body..slot.end - 1].fill(b' ');
    bytes[slot.end - 1] = b']';

    Ok(())
}

fn find_all<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, window)| *window == needle)
        .map(|(i, _)| i)
}

/// Find the last occurrence of a pattern in bytes
fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let len = needle.len();
    if len == 0 || len > haystack.len() {
        return None;
    }

    (0..=(haystack.len() - len))
        .rev()
        .find(|&i| &haystack[i..i + len] == needle)
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_pdf_whitespace(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn is_pdf_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

/// `[...]` starting after optional whitespace at `pos`
fn array_after(bytes: &[u8], pos: usize) -> Option<Range<usize>> {
    let start = skip_whitespace(bytes, pos);
    if bytes.get(start) != Some(&b'[') {
        return None;
    }
    let len = bytes[start..].iter().position(|&b| b == b']')?;
    Some(start..start + len + 1)
}

/// `<000...0>` starting after optional whitespace at `pos`
fn zero_hex_string_after(bytes: &[u8], pos: usize) -> Option<Range<usize>> {
    let start = skip_whitespace(bytes, pos);
    if bytes.get(start) != Some(&b'<') {
        return None;
    }
    let digits = bytes[start + 1..].iter().take_while(|&&b| b == PAD).count();
    let end = start + 1 + digits;

    if digits == 0 || digits % 2 != 0 || bytes.get(end) != Some(&b'>') {
        return None;
    }
    Some(start..end + 1)
}

/// Array body made of exactly four sentinel names
fn is_sentinel_array(body: &[u8]) -> bool {
    let mut pos = 0;
    let mut count = 0;

    loop {
        pos = skip_whitespace(body, pos);
        if pos == body.len() {
            return count == 4;
        }
        if body[pos] != b'/' || !body[pos + 1..].starts_with(BYTE_RANGE_SENTINEL) {
            return false;
        }
        pos += 1 + BYTE_RANGE_SENTINEL.len();
        count += 1;
    }
}

fn parse_integers(body: &[u8]) -> Option<[usize; 4]> {
    let text = std::str::from_utf8(body).ok()?;
    let values: Vec<usize> = text
        .split(|c: char| c.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    values.try_into().ok()
}

/// Byte span of the indirect object containing `pos`, bounded by the
/// surrounding `endobj` keywords.
fn enclosing_object(bytes: &[u8], pos: usize) -> Range<usize> {
    let start = find_last(&bytes[..pos], END_OBJECT)
        .map(|i| i + END_OBJECT.len())
        .unwrap_or(0);
    let end = find_all(&bytes[pos..], END_OBJECT)
        .next()
        .map(|i| pos + i)
        .unwrap_or(bytes.len());
    start..end
}


#[cfg(test)]
mod proptests {
    use super::tests::FixedSigner;
    use super::*;
    use proptest::prelude::*;

    fn filler() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(b'a'..=b'z', 0..512)
    }

    proptest! {
        /// Embedding never changes the length and the ByteRange always
        /// brackets exactly the Contents string
        #[test]
        fn byte_range_arithmetic(
            prefix in filler(),
            suffix in filler(),
            capacity in 1usize..128,
            sig_len in 0usize..128,
        ) {
            prop_assume!(sig_len <= capacity);
            let mut injected = prefix.clone();
            injected.extend_from_slice(b"1 0 obj\n<</ByteRange[/**********/**********/**********/**********]/Contents<");
            injected.extend(std::iter::repeat(b'0').take(capacity * 2));
            injected.extend_from_slice(b">>>\nendobj\n");
            injected.extend_from_slice(&suffix);

            let placeholder = locate_placeholder(&injected).unwrap();
            let signed = sign_in_place(&injected, &FixedSigner(vec![0xFF; sig_len]), DigestAlgorithm::Sha256).unwrap();
            let [a, b, c, d] = signed.byte_range.0;

            prop_assert_eq!(signed.bytes.len(), injected.len());
            prop_assert_eq!(a, 0);
            prop_assert_eq!(a + b, placeholder.contents.start);
            prop_assert_eq!(c, placeholder.contents.end);
            prop_assert_eq!(c + d, signed.bytes.len());
            prop_assert_eq!(&signed.bytes[..prefix.len()], prefix.as_slice());
            prop_assert_eq!(&signed.bytes[signed.bytes.len() - suffix.len()..], suffix.as_slice());
        }

        /// Oversized signatures always fail instead of being truncated
        #[test]
        fn oversize_always_rejected(capacity in 1usize..64, extra in 1usize..64) {
            let mut injected = b"1 0 obj\n<</ByteRange[/**********/**********/**********/**********]/Contents<".to_vec();
            injected.extend(std::iter::repeat(b'0').take(capacity * 2));
            injected.extend_from_slice(b">>>\nendobj\n");

            let result = sign_in_place(&injected, &FixedSigner(vec![1; capacity + extra]), DigestAlgorithm::Sha256);
            let is_too_large = matches!(result, Err(PdfError::SignatureTooLarge { .. }));
            prop_assert!(is_too_large);
        }
    }
}
