//! Byte buffers exchanged between pipeline stages

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lopdf::Document;
use std::fmt;

use crate::error::{Error, Result};

/// One complete PDF document as bytes.
///
/// Stages never mutate a buffer they were handed; they return a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer(Vec<u8>);

impl ByteBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        ByteBuffer(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// True when the payload starts with the `%PDF` marker
    pub fn looks_like_pdf(&self) -> bool {
        self.0.starts_with(b"%PDF")
    }

    /// Serialize a lopdf document
    pub fn from_document(doc: &mut Document) -> Result<Self> {
        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(ByteBuffer(out))
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        ByteBuffer(bytes)
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer({} bytes)", self.0.len())
    }
}

/// The shapes a PDF payload may arrive in
pub enum PdfInput {
    /// Raw PDF bytes
    Raw(ByteBuffer),
    /// Base64 text, optionally carrying a `data:...;base64,` prefix
    Base64(String),
    /// A document somebody already parsed
    Decoded(Document),
}

impl PdfInput {
    /// Bring every input shape to a parsed document.
    pub fn normalize(self) -> Result<Document> {
        match self {
            PdfInput::Raw(buffer) => Ok(Document::load_mem(buffer.as_bytes())?),
            PdfInput::Base64(text) => {
                let bytes = decode_base64_payload(&text)?;
                Ok(Document::load_mem(&bytes)?)
            }
            PdfInput::Decoded(doc) => Ok(doc),
        }
    }
}

impl fmt::Debug for PdfInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfInput::Raw(buffer) => write!(f, "Raw({:?})", buffer),
            PdfInput::Base64(text) => write!(f, "Base64({} chars)", text.len()),
            PdfInput::Decoded(doc) => write!(f, "Decoded({} objects)", doc.objects.len()),
        }
    }
}

impl From<ByteBuffer> for PdfInput {
    fn from(buffer: ByteBuffer) -> Self {
        PdfInput::Raw(buffer)
    }
}

impl From<Vec<u8>> for PdfInput {
    fn from(bytes: Vec<u8>) -> Self {
        PdfInput::Raw(ByteBuffer(bytes))
    }
}

impl From<Document> for PdfInput {
    fn from(doc: Document) -> Self {
        PdfInput::Decoded(doc)
    }
}

/// Decode base64 text, dropping a data-URL prefix and embedded whitespace
pub fn decode_base64_payload(text: &str) -> Result<Vec<u8>> {
    let payload = match text.find("base64,") {
        Some(pos) if text.starts_with("data:") => &text[pos + "base64,".len()..],
        _ => text,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// Encode bytes as a `data:` URL
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        assert_eq!(decode_base64_payload("JVBERi0=").unwrap(), b"%PDF-");
    }

    #[test]
    fn test_decode_data_url() {
        let url = "data:application/pdf;base64,JVBE\nRi0=";
        assert_eq!(decode_base64_payload(url).unwrap(), b"%PDF-");
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(matches!(
            decode_base64_payload("***"),
            Err(Error::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = to_data_url("application/pdf", b"%PDF-1.5");
        assert!(url.starts_with("data:application/pdf;base64,"));
        assert_eq!(decode_base64_payload(&url).unwrap(), b"%PDF-1.5");
    }

    #[test]
    fn test_normalize_garbage_fails() {
        let input = PdfInput::from(b"not a pdf".to_vec());
        assert!(input.normalize().is_err());
    }
}
