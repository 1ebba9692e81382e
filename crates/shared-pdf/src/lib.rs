//! Shared PDF handling utilities
//!
//! This crate provides the PDF side of document signing: loading and flat
//! re-serialization, signature placeholder injection, and ByteRange
//! resolution with in-place signature embedding.

pub mod byte_range;
pub mod error;
pub mod parser;
pub mod placeholder;

pub use byte_range::{
    locate_placeholder, resolve_byte_range, sign_in_place, signed_ranges_digest, ByteRange,
    ResolvedPlaceholder, SignaturePlaceholder, SignedPdf,
};
pub use error::{PdfError, Result};
pub use parser::PdfDocument;
pub use placeholder::{
    add_signature_field, inject_placeholder, InjectedObjects, PlaceholderOptions,
    DEFAULT_PLACEHOLDER_CAPACITY,
};
