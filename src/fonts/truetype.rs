//! Custom TrueType faces embedded as simple WinAnsi fonts

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rustybuzz::ttf_parser::GlyphId;
use rustybuzz::Face;

use super::encoding::decode_char;
use super::FontMetrics;
use crate::error::{Error, Result};

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// A parsed TrueType/OpenType face with its WinAnsi widths resolved
pub struct TrueTypeFont {
    name: String,
    data: Arc<Vec<u8>>,
    /// Advance per code FIRST_CHAR..=LAST_CHAR in 1/1000 em
    widths: Vec<u16>,
    ascent: i64,
    descent: i64,
    cap_height: i64,
    bbox: [i64; 4],
}

impl TrueTypeFont {
    /// Read a font file from disk
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Font(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_bytes(name, data)
    }

    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self> {
        let face = Face::from_slice(&data, 0)
            .ok_or_else(|| Error::Font(format!("{} is not a TrueType/OpenType font", name)))?;

        let units_per_em = face.units_per_em().max(1) as f32;
        let scale = |v: f32| (v * 1000.0 / units_per_em).round() as i64;

        let notdef = face.glyph_hor_advance(GlyphId(0)).unwrap_or(0);
        let widths = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                let advance = decode_char(code)
                    .and_then(|c| face.glyph_index(c))
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(notdef);
                scale(f32::from(advance)).clamp(0, i64::from(u16::MAX)) as u16
            })
            .collect();

        let bbox = face.global_bounding_box();
        let ascent = scale(f32::from(face.ascender()));
        let cap_height = face
            .capital_height()
            .map(|h| scale(f32::from(h)))
            .unwrap_or(ascent);
        let descent = scale(f32::from(face.descender()));
        let bbox = [
            scale(f32::from(bbox.x_min)),
            scale(f32::from(bbox.y_min)),
            scale(f32::from(bbox.x_max)),
            scale(f32::from(bbox.y_max)),
        ];
        drop(face);

        Ok(Self {
            name: pdf_font_name(name),
            data: Arc::new(data),
            widths,
            ascent,
            descent,
            cap_height,
            bbox,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Embed the font program and a TrueType font dictionary with WinAnsiEncoding
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        // Create font stream object (the actual TTF data)
        let mut font_stream_dict = Dictionary::new();
        font_stream_dict.set("Length1", Object::Integer(self.data.len() as i64));
        let font_stream = Stream {
            dict: font_stream_dict,
            content: self.data.as_ref().clone(),
            allows_compression: true,
            start_position: None,
        };
        let font_stream_id = doc.add_object(Object::Stream(font_stream));

        let mut font_descriptor = Dictionary::new();
        font_descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
        font_descriptor.set("FontName", Object::Name(self.name.as_bytes().to_vec()));
        font_descriptor.set("Flags", Object::Integer(32)); // Nonsymbolic
        font_descriptor.set(
            "FontBBox",
            Object::Array(self.bbox.iter().copied().map(Object::Integer).collect()),
        );
        font_descriptor.set("ItalicAngle", Object::Integer(0));
        font_descriptor.set("Ascent", Object::Integer(self.ascent));
        font_descriptor.set("Descent", Object::Integer(self.descent));
        font_descriptor.set("CapHeight", Object::Integer(self.cap_height));
        font_descriptor.set("StemV", Object::Integer(80));
        font_descriptor.set("FontFile2", Object::Reference(font_stream_id));
        let font_descriptor_id = doc.add_object(Object::Dictionary(font_descriptor));

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"TrueType".to_vec()));
        font.set("BaseFont", Object::Name(self.name.as_bytes().to_vec()));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        font.set("FontDescriptor", Object::Reference(font_descriptor_id));
        font.set("FirstChar", Object::Integer(i64::from(FIRST_CHAR)));
        font.set("LastChar", Object::Integer(i64::from(LAST_CHAR)));
        font.set(
            "Widths",
            Object::Array(
                self.widths
                    .iter()
                    .map(|&w| Object::Integer(i64::from(w)))
                    .collect(),
            ),
        );
        doc.add_object(Object::Dictionary(font))
    }
}

impl FontMetrics for TrueTypeFont {
    fn code_width(&self, code: u8) -> u16 {
        if code < FIRST_CHAR {
            return 0;
        }
        self.widths[(code - FIRST_CHAR) as usize]
    }
}

impl fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Family names may contain spaces; PDF names used as BaseFont should not
fn pdf_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "CustomFont".to_string()
    } else {
        cleaned
    }
}
