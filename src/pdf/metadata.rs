//! Document metadata: writing the Info dictionary and inspecting finished PDFs

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};

use super::merge::Bookmark;
use super::page::resolve;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Optional document properties; only the fields that are set get written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.subject.is_none()
            && self.keywords.is_none()
            && self.creation_date.is_none()
    }

    /// Write the set fields into the document's Info dictionary
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let existing = doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|info| info.as_reference().ok());

        let info_id = match existing {
            Some(id) if doc.get_object(id).and_then(Object::as_dict).is_ok() => id,
            _ => {
                let id = doc.add_object(Object::Dictionary(Dictionary::new()));
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };

        let info = doc.get_object_mut(info_id)?.as_dict_mut()?;
        let fields = [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                info.set(key, text_string(value));
            }
        }
        if let Some(date) = self.creation_date {
            info.set("CreationDate", Object::string_literal(pdf_date(&date)));
        }
        Ok(())
    }
}

/// Encode a PDF text string: literal for printable ASCII, UTF-16BE otherwise
pub fn text_string(text: &str) -> Object {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding ~ Latin-1)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// `D:YYYYMMDDHHmmSSZ`
pub fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// What a finished PDF reports about itself
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfInfo {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creation_date: Option<String>,
    /// Top-level outline entries
    pub bookmarks: Vec<Bookmark>,
}

/// Parse a buffer and report page count, Info fields and outline
pub fn inspect(buffer: &ByteBuffer) -> Result<PdfInfo> {
    let doc = Document::load_mem(buffer.as_bytes())?;
    inspect_document(&doc)
}

pub fn inspect_document(doc: &Document) -> Result<PdfInfo> {
    let pages = doc.get_pages();
    let mut info = PdfInfo {
        page_count: pages.len(),
        bookmarks: read_outline(doc, &pages),
        ..Default::default()
    };

    if let Ok(info_ref) = doc.trailer.get(b"Info") {
        if let Ok(Object::Dictionary(info_dict)) = resolve(doc, info_ref) {
            let field = |key: &[u8]| -> Option<String> {
                match resolve(doc, info_dict.get(key).ok()?).ok()? {
                    Object::String(bytes, _) => Some(decode_text_string(bytes)),
                    _ => None,
                }
            };
            info.title = field(b"Title");
            info.author = field(b"Author");
            info.subject = field(b"Subject");
            info.keywords = field(b"Keywords");
            info.creation_date = field(b"CreationDate");
        }
    }
    Ok(info)
}

/// Count the pages of a serialized PDF
pub fn count_pages(buffer: &ByteBuffer) -> Result<usize> {
    let doc = Document::load_mem(buffer.as_bytes())?;
    let count = doc.get_pages().len();
    if count == 0 {
        return Err(Error::General("PDF has no pages".to_string()));
    }
    Ok(count)
}

/// Walk the top level of the outline tree
fn read_outline(doc: &Document, pages: &BTreeMap<u32, ObjectId>) -> Vec<Bookmark> {
    let page_index: BTreeMap<ObjectId, usize> = pages
        .values()
        .enumerate()
        .map(|(index, id)| (*id, index))
        .collect();

    let first = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Outlines").ok())
        .and_then(|outlines| resolve(doc, outlines).ok())
        .and_then(|outlines| outlines.as_dict().ok())
        .and_then(|outlines| outlines.get(b"First").ok())
        .and_then(|first| first.as_reference().ok());

    let mut bookmarks = Vec::new();
    let mut visited = HashSet::new();
    let mut next = first;
    while let Some(item_id) = next {
        if !visited.insert(item_id) {
            break;
        }
        let Ok(item) = doc.get_object(item_id).and_then(Object::as_dict) else {
            break;
        };
        let title = match item.get(b"Title").ok().and_then(|t| resolve(doc, t).ok()) {
            Some(Object::String(bytes, _)) => decode_text_string(bytes),
            _ => String::new(),
        };
        let target = item
            .get(b"Dest")
            .ok()
            .and_then(|dest| resolve(doc, dest).ok())
            .and_then(|dest| dest.as_array().ok())
            .and_then(|dest| dest.first())
            .and_then(|page| page.as_reference().ok())
            .and_then(|page| page_index.get(&page).copied());
        if let Some(page_index) = target {
            bookmarks.push(Bookmark { title, page_index });
        }
        next = item.get(b"Next").ok().and_then(|n| n.as_reference().ok());
    }
    bookmarks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_document, sample_pdf};
    use chrono::TimeZone;

    #[test]
    fn test_apply_sets_only_given_fields() {
        let mut doc = sample_document(1, "Meta", (595, 842));
        let metadata = DocumentMetadata {
            title: Some("Bewerbung".to_string()),
            author: Some("Jürgen Muster".to_string()),
            ..Default::default()
        };
        metadata.apply(&mut doc).unwrap();

        let info = inspect_document(&doc).unwrap();
        assert_eq!(info.title.as_deref(), Some("Bewerbung"));
        assert_eq!(info.author.as_deref(), Some("Jürgen Muster"));
        assert_eq!(info.subject, None);
        assert_eq!(info.creation_date, None);
    }

    #[test]
    fn test_empty_metadata_adds_no_info() {
        let mut doc = sample_document(1, "Meta", (595, 842));
        DocumentMetadata::default().apply(&mut doc).unwrap();
        assert!(doc.trailer.get(b"Info").is_err());
    }

    #[test]
    fn test_pdf_date_format() {
        let date = Utc.with_ymd_and_hms(2026, 1, 14, 9, 30, 0).unwrap();
        assert_eq!(pdf_date(&date), "D:20260114093000Z");
    }

    #[test]
    fn test_text_string_encoding() {
        assert_eq!(
            text_string("CV"),
            Object::String(b"CV".to_vec(), StringFormat::Literal)
        );
        match text_string("Zeugnis ä") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(decode_text_string(&bytes), "Zeugnis ä");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_count_pages() {
        assert_eq!(count_pages(&sample_pdf(3, "Count")).unwrap(), 3);
        assert!(count_pages(&ByteBuffer::new(b"%PDF-1.4 garbage".to_vec())).is_err());
    }
}
