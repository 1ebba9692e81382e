//! PDF parsing and re-serialization using lopdf

use crate::error::{PdfError, Result};
use lopdf::{Document, Object, ObjectId};

/// Trailer keys that only make sense next to a cross-reference stream or a
/// previous revision. A flat rewrite drops them.
const STALE_TRAILER_KEYS: [&[u8]; 8] = [
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
    b"Prev",
    b"XRefStm",
];

/// Wrapper around lopdf::Document for the signing pipeline
pub struct PdfDocument {
    pub(crate) doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes. A document without a catalog or pages is
    /// rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| PdfError::MalformedDocument(format!("PDF parse error: {}", e)))?;

        doc.catalog()
            .map_err(|e| PdfError::MalformedDocument(format!("Missing catalog: {}", e)))?;

        if doc.get_pages().is_empty() {
            return Err(PdfError::MalformedDocument(
                "Document has no pages".to_string(),
            ));
        }

        Ok(Self { doc })
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get page object ID for a given page number (1-indexed)
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    /// Get the underlying lopdf document
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Get mutable access to the underlying lopdf document
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialize with a classic cross-reference table and every object
    /// written uncompressed at top level, so byte offsets can be found by
    /// scanning.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>> {
        self.flatten_object_streams();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    /// Drop object streams and cross-reference streams. lopdf has already
    /// unpacked their members into the object table on load.
    fn flatten_object_streams(&mut self) {
        let stale: Vec<ObjectId> = self
            .doc
            .objects
            .iter()
            .filter(|(_, object)| is_structural_stream(object))
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            self.doc.objects.remove(&id);
        }

        for key in STALE_TRAILER_KEYS {
            self.doc.trailer.remove(key);
        }
    }
}

fn is_structural_stream(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => stream
            .dict
            .get(b"Type")
            .and_then(Object::as_name)
            .map(|name| name == b"ObjStm" || name == b"XRef")
            .unwrap_or(false),
        _ => false,
    }
}
