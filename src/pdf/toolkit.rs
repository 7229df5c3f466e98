//! The PDF manipulation provider: parsing, serializing and font access
//! shared by the merge, annotation and compression stages.

use std::sync::Arc;

use lopdf::Document;
use tracing::debug;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::fonts::{FontFace, FontLibrary, FontStyle, DEFAULT_FAMILY};

#[derive(Debug, Clone)]
pub struct PdfToolkit {
    fonts: Arc<FontLibrary>,
    annotation_family: String,
}

impl PdfToolkit {
    pub fn new(fonts: Arc<FontLibrary>, annotation_family: impl Into<String>) -> Self {
        Self {
            fonts,
            annotation_family: annotation_family.into(),
        }
    }

    /// Parse a serialized PDF
    pub fn load(&self, buffer: &ByteBuffer) -> Result<Document> {
        let doc = Document::load_mem(buffer.as_bytes())?;
        debug!("Loaded PDF: {} pages, {} objects", doc.get_pages().len(), doc.objects.len());
        Ok(doc)
    }

    /// Serialize a document into a new buffer
    pub fn save(&self, doc: &mut Document) -> Result<ByteBuffer> {
        ByteBuffer::from_document(doc)
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    /// Face used for stamped overlays
    pub fn annotation_face(&self, style: FontStyle) -> &FontFace {
        self.fonts.resolve(&self.annotation_family).face(style)
    }
}

impl Default for PdfToolkit {
    fn default() -> Self {
        Self::new(Arc::new(FontLibrary::builtin()), DEFAULT_FAMILY)
    }
}
