//! Signature placeholder injection
//!
//! Adds an empty signature to a PDF: a signature dictionary whose
//! `ByteRange` holds sentinel names and whose `Contents` is a zero-filled
//! hex string of fixed capacity, a widget annotation referencing it, and the
//! AcroForm and page wiring that makes the widget a signature field. The
//! document is then rewritten flat so both fields can be found by scanning.

use crate::error::{PdfError, Result};
use crate::parser::PdfDocument;
use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::HashSet;

/// Signature bytes reserved by default (16384 hex characters)
pub const DEFAULT_PLACEHOLDER_CAPACITY: usize = 8192;

/// Name written four times into the unresolved `ByteRange`. Wide enough
/// that the resolved array always fits in the bytes it occupies.
pub(crate) const BYTE_RANGE_SENTINEL: &[u8] = b"**********";

/// Widget flags: Print | Locked
const WIDGET_FLAGS: i64 = 4 | 128;

/// AcroForm SigFlags: SignaturesExist | AppendOnly
const SIG_FLAGS: i64 = 1 | 2;

const FIELD_NAME_PREFIX: &str = "Signature";

/// What goes into the injected signature dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderOptions {
    /// Signature bytes reserved in `Contents`
    pub capacity: usize,
    pub name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    /// Written as the `M` entry
    pub signing_time: DateTime<Utc>,
}

impl PlaceholderOptions {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            name: None,
            reason: None,
            location: None,
            contact_info: None,
            signing_time: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }

    pub fn with_signing_time(mut self, signing_time: DateTime<Utc>) -> Self {
        self.signing_time = signing_time;
        self
    }
}

impl Default for PlaceholderOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_CAPACITY)
    }
}

/// Objects created by an injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedObjects {
    pub signature_id: ObjectId,
    pub widget_id: ObjectId,
}

/// Inject a signature placeholder and return the re-serialized document.
///
/// Structural problems with the input surface as
/// [`PdfError::MalformedDocument`]; nothing is written for them.
pub fn inject_placeholder(pdf_bytes: &[u8], options: &PlaceholderOptions) -> Result<Vec<u8>> {
    let mut pdf = PdfDocument::from_bytes(pdf_bytes)?;
    let objects = add_signature_field(&mut pdf, options)?;
    let bytes = pdf.save_to_bytes()?;

    tracing::debug!(
        input_len = pdf_bytes.len(),
        output_len = bytes.len(),
        capacity = options.capacity,
        signature_id = objects.signature_id.0,
        widget_id = objects.widget_id.0,
        "Injected signature placeholder"
    );

    Ok(bytes)
}

/// Add the signature dictionary, widget and form wiring to a loaded
/// document without serializing it.
pub fn add_signature_field(
    pdf: &mut PdfDocument,
    options: &PlaceholderOptions,
) -> Result<InjectedObjects> {
    if options.capacity == 0 {
        return Err(PdfError::InvalidOptions(
            "Placeholder capacity must be at least one byte".to_string(),
        ));
    }

    if let Some(id) = existing_signature(pdf.doc()) {
        return Err(PdfError::MalformedDocument(format!(
            "Document already carries a signature in object {} {}; a flat rewrite would invalidate it",
            id.0, id.1
        )));
    }

    let page_id = pdf
        .page_id(1)
        .ok_or_else(|| PdfError::MalformedDocument("Document has no pages".to_string()))?;

    let doc = pdf.doc_mut();
    let acroform_id = acroform_id(doc)?;
    let field_name = next_field_name(doc, acroform_id)?;

    let signature_id = doc.add_object(Object::Dictionary(signature_dictionary(options)));
    let widget_id = doc.add_object(Object::Dictionary(widget_dictionary(
        signature_id,
        page_id,
        &field_name,
    )));

    add_to_acroform(doc, acroform_id, widget_id)?;
    add_to_page_annots(doc, page_id, widget_id)?;

    Ok(InjectedObjects {
        signature_id,
        widget_id,
    })
}

/// First object that looks like a signature dictionary, placeholder or
/// resolved. Rewriting such a document moves the bytes its `ByteRange`
/// covers.
fn existing_signature(doc: &Document) -> Option<ObjectId> {
    doc.objects
        .iter()
        .find(|(_, object)| {
            object.as_dict().is_ok_and(|dict| {
                let is_sig = dict.get(b"Type").and_then(Object::as_name).ok() == Some(b"Sig".as_slice());
                is_sig || (dict.has(b"ByteRange") && dict.has(b"Contents"))
            })
        })
        .map(|(id, _)| *id)
}

fn signature_dictionary(options: &PlaceholderOptions) -> Dictionary {
    let mut sig_dict = Dictionary::new();
    sig_dict.set("Type", Object::Name(b"Sig".to_vec()));
    sig_dict.set("Filter", Object::Name(b"Adobe.PPKLite".to_vec()));
    sig_dict.set("SubFilter", Object::Name(b"adbe.pkcs7.detached".to_vec()));

    let sentinel = Object::Name(BYTE_RANGE_SENTINEL.to_vec());
    sig_dict.set("ByteRange", Object::Array(vec![sentinel; 4]));

    sig_dict.set(
        "Contents",
        Object::String(vec![0; options.capacity], StringFormat::Hexadecimal),
    );

    sig_dict.set("M", literal(&pdf_date(&options.signing_time)));

    let optional = [
        ("Name", &options.name),
        ("Reason", &options.reason),
        ("Location", &options.location),
        ("ContactInfo", &options.contact_info),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            sig_dict.set(key, literal(value));
        }
    }

    sig_dict
}

fn widget_dictionary(signature_id: ObjectId, page_id: ObjectId, field_name: &str) -> Dictionary {
    let mut widget = Dictionary::new();
    widget.set("Type", Object::Name(b"Annot".to_vec()));
    widget.set("Subtype", Object::Name(b"Widget".to_vec()));
    widget.set("FT", Object::Name(b"Sig".to_vec()));

    // Invisible signature
    widget.set(
        "Rect",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );

    widget.set("V", Object::Reference(signature_id));
    widget.set("T", literal(field_name));
    widget.set("F", Object::Integer(WIDGET_FLAGS));
    widget.set("P", Object::Reference(page_id));
    widget
}

/// Find the AcroForm, creating it or hoisting a direct one into its own
/// object so it can be edited by id.
fn acroform_id(doc: &mut Document) -> Result<ObjectId> {
    let existing = catalog(doc)?.get(b"AcroForm").ok().cloned();

    let id = match existing {
        Some(Object::Reference(id)) => return Ok(id),
        Some(Object::Dictionary(acroform)) => doc.add_object(Object::Dictionary(acroform)),
        Some(_) => {
            return Err(PdfError::MalformedDocument(
                "AcroForm is not a dictionary".to_string(),
            ))
        }
        None => {
            let mut acroform = Dictionary::new();
            acroform.set("Fields", Object::Array(vec![]));
            doc.add_object(Object::Dictionary(acroform))
        }
    };

    doc.catalog_mut()
        .map_err(|e| PdfError::MalformedDocument(format!("Failed to get catalog: {}", e)))?
        .set("AcroForm", Object::Reference(id));

    Ok(id)
}

fn catalog(doc: &Document) -> Result<&Dictionary> {
    doc.catalog()
        .map_err(|e| PdfError::MalformedDocument(format!("Failed to get catalog: {}", e)))
}

fn dictionary_mut<'a>(
    doc: &'a mut Document,
    id: ObjectId,
    what: &str,
) -> Result<&'a mut Dictionary> {
    doc.get_object_mut(id)
        .map_err(|e| PdfError::MalformedDocument(format!("Failed to get {}: {}", what, e)))?
        .as_dict_mut()
        .map_err(|_| PdfError::MalformedDocument(format!("{} is not a dictionary", what)))
}

/// First `SignatureN` not already used by a top-level form field
fn next_field_name(doc: &Document, acroform_id: ObjectId) -> Result<String> {
    let acroform = doc
        .get_object(acroform_id)
        .and_then(Object::as_dict)
        .map_err(|_| PdfError::MalformedDocument("AcroForm is not a dictionary".to_string()))?;

    let fields = match acroform.get(b"Fields") {
        Ok(fields) => resolve(doc, fields)
            .as_array()
            .map_err(|_| PdfError::MalformedDocument("Fields is not an array".to_string()))?
            .clone(),
        Err(_) => Vec::new(),
    };

    let taken: HashSet<Vec<u8>> = fields
        .iter()
        .filter_map(|field| resolve(doc, field).as_dict().ok())
        .filter_map(|field| field.get(b"T").ok())
        .filter_map(|name| name.as_str().ok())
        .map(<[u8]>::to_vec)
        .collect();

    let name = (1..)
        .map(|n| format!("{}{}", FIELD_NAME_PREFIX, n))
        .find(|candidate| !taken.contains(candidate.as_bytes()))
        .unwrap_or_else(|| FIELD_NAME_PREFIX.to_string());

    Ok(name)
}

fn add_to_acroform(doc: &mut Document, acroform_id: ObjectId, widget_id: ObjectId) -> Result<()> {
    let fields = dictionary_mut(doc, acroform_id, "AcroForm")?
        .get(b"Fields")
        .ok()
        .cloned();

    match fields {
        Some(Object::Reference(fields_id)) => {
            doc.get_object_mut(fields_id)
                .map_err(|e| PdfError::MalformedDocument(format!("Failed to get Fields: {}", e)))?
                .as_array_mut()
                .map_err(|_| PdfError::MalformedDocument("Fields is not an array".to_string()))?
                .push(Object::Reference(widget_id));
        }
        Some(Object::Array(mut fields)) => {
            fields.push(Object::Reference(widget_id));
            dictionary_mut(doc, acroform_id, "AcroForm")?.set("Fields", Object::Array(fields));
        }
        Some(_) => {
            return Err(PdfError::MalformedDocument(
                "Fields is not an array".to_string(),
            ))
        }
        None => {
            dictionary_mut(doc, acroform_id, "AcroForm")?
                .set("Fields", Object::Array(vec![Object::Reference(widget_id)]));
        }
    }

    let acroform = dictionary_mut(doc, acroform_id, "AcroForm")?;
    let existing_flags = acroform
        .get(b"SigFlags")
        .ok()
        .and_then(|flags| flags.as_i64().ok())
        .unwrap_or(0);
    acroform.set("SigFlags", Object::Integer(existing_flags | SIG_FLAGS));

    Ok(())
}

/// Append the widget to the page's `Annots`, which may be direct or indirect
fn add_to_page_annots(doc: &mut Document, page_id: ObjectId, widget_id: ObjectId) -> Result<()> {
    let annots = dictionary_mut(doc, page_id, "page")?
        .get(b"Annots")
        .ok()
        .cloned();

    match annots {
        Some(Object::Reference(annots_id)) => {
            doc.get_object_mut(annots_id)
                .map_err(|e| PdfError::MalformedDocument(format!("Failed to get Annots: {}", e)))?
                .as_array_mut()
                .map_err(|_| {
                    PdfError::MalformedDocument("Annots reference is not an array".to_string())
                })?
                .push(Object::Reference(widget_id));
        }
        Some(Object::Array(mut annots)) => {
            annots.push(Object::Reference(widget_id));
            dictionary_mut(doc, page_id, "page")?.set("Annots", Object::Array(annots));
        }
        Some(_) => {
            return Err(PdfError::MalformedDocument(
                "Annots is not an array".to_string(),
            ))
        }
        None => {
            dictionary_mut(doc, page_id, "page")?
                .set("Annots", Object::Array(vec![Object::Reference(widget_id)]));
        }
    }

    Ok(())
}

/// Follow a single indirect reference, leaving direct objects as they are
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

/// PDF date string, always in UTC
fn pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::parser::tests::create_test_pdf;
    use lopdf::dictionary;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// The zero-filled Contents string always has the requested width
        #[test]
        fn contents_matches_capacity(capacity in 1usize..2048) {
            let injected = inject_placeholder(
                &create_test_pdf(1),
                &PlaceholderOptions::new(capacity),
            ).unwrap();

            let zeros = vec![b'0'; capacity * 2];
            let field = [b"<".as_slice(), &zeros, b">"].concat();
            prop_assert!(injected.windows(field.len()).any(|w| w == field.as_slice()));
        }

        /// Field names never collide with existing ones
        #[test]
        fn field_name_skips_taken(taken in 1usize..6) {
            let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
            let fields: Vec<Object> = (1..=taken)
                .map(|n| {
                    let id = doc.add_object(dictionary! {
                        "T" => Object::String(
                            format!("Signature{}", n).into_bytes(),
                            StringFormat::Literal,
                        ),
                    });
                    Object::Reference(id)
                })
                .collect();
            let acroform_id = doc.add_object(dictionary! { "Fields" => fields });

            let name = next_field_name(&doc, acroform_id).unwrap();
            prop_assert_eq!(name, format!("Signature{}", taken + 1));
        }
    }
}
