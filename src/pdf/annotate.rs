//! Overlays stamped onto finished documents: running page numbers and
//! rotated, semi-transparent watermarks.
//!
//! Each pass is all-or-nothing. Page numbers are stamped on a working copy
//! that replaces the caller's document only once every page succeeded, and a
//! watermark always produces a new buffer from a fresh parse of the input.

use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use tiny_skia_path::Transform;
use tracing::{debug, info};

use super::page::{add_page_resource, overlay_content, page_box, PageBox};
use super::toolkit::PdfToolkit;
use crate::buffer::ByteBuffer;
use crate::color::Color;
use crate::error::{Error, Result};
use crate::fonts::{encode_win_ansi, FontMetrics, FontStyle};

/// Placeholders substituted in page-number templates
const CURRENT: &str = "{current}";
const TOTAL: &str = "{total}";

/// Where a page number sits on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    BottomLeft,
    BottomRight,
    TopCenter,
    #[default]
    BottomCenter,
}

impl Anchor {
    /// Baseline origin of a text run `text_width` points wide
    pub fn position(self, page: &PageBox, text_width: f32, margin: f32) -> (f32, f32) {
        let (w, h) = (page.width(), page.height());
        let (x, y) = match self {
            Anchor::BottomLeft => (margin, margin),
            Anchor::BottomRight => (w - text_width - margin, margin),
            Anchor::TopCenter => ((w - text_width) / 2.0, h - margin),
            Anchor::BottomCenter => ((w - text_width) / 2.0, margin),
        };
        (page.llx + x, page.lly + y)
    }
}

impl std::str::FromStr for Anchor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottom-left" => Ok(Anchor::BottomLeft),
            "bottom-right" => Ok(Anchor::BottomRight),
            "top-center" => Ok(Anchor::TopCenter),
            "bottom-center" => Ok(Anchor::BottomCenter),
            other => Err(Error::General(format!("Unknown anchor: {}", other))),
        }
    }
}

/// Running page numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNumberSpec {
    /// Text with `{current}` (1-based) and `{total}` placeholders
    pub template: String,
    pub font_size: f32,
    pub anchor: Anchor,
    /// Distance from the anchored page edges, in points
    pub margin: f32,
    pub color: Color,
}

impl Default for PageNumberSpec {
    fn default() -> Self {
        Self {
            template: "Seite {current} von {total}".to_string(),
            font_size: 10.0,
            anchor: Anchor::BottomCenter,
            margin: 30.0,
            color: Color::gray(0.4),
        }
    }
}

impl PageNumberSpec {
    pub fn render(&self, current: usize, total: usize) -> String {
        self.template
            .replace(CURRENT, &current.to_string())
            .replace(TOTAL, &total.to_string())
    }
}

/// Diagonal text stamped across every page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSpec {
    pub text: String,
    pub font_size: f32,
    /// Fill opacity, clamped to `0.0..=1.0`
    pub opacity: f32,
    /// Counter-clockwise rotation around the text origin
    pub rotation_degrees: f32,
    pub color: Color,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 60.0,
            opacity: 0.15,
            rotation_degrees: -45.0,
            color: Color::gray(0.5),
        }
    }
}

impl WatermarkSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

pub struct AnnotationEngine {
    toolkit: Arc<PdfToolkit>,
}

impl AnnotationEngine {
    pub fn new(toolkit: Arc<PdfToolkit>) -> Self {
        Self { toolkit }
    }

    /// Stamp `spec` onto every page of `doc`.
    ///
    /// On error `doc` is left exactly as it was.
    pub fn add_page_numbers(&self, doc: &mut Document, spec: &PageNumberSpec) -> Result<()> {
        let mut working = doc.clone();
        let total = self
            .stamp_page_numbers(&mut working, spec)
            .map_err(annotation_failure)?;
        *doc = working;
        info!("Stamped page numbers on {} pages", total);
        Ok(())
    }

    /// Return a new buffer with the watermark drawn over every page.
    pub fn add_watermark(&self, buffer: &ByteBuffer, spec: &WatermarkSpec) -> Result<ByteBuffer> {
        let mut doc = self.toolkit.load(buffer).map_err(annotation_failure)?;
        let pages = self
            .stamp_watermark(&mut doc, spec)
            .map_err(annotation_failure)?;
        let out = self.toolkit.save(&mut doc).map_err(annotation_failure)?;
        info!(
            "Watermarked {} pages: {} -> {} bytes",
            pages,
            buffer.len(),
            out.len()
        );
        Ok(out)
    }

    fn stamp_page_numbers(&self, doc: &mut Document, spec: &PageNumberSpec) -> Result<usize> {
        let pages = page_ids(doc)?;
        let total = pages.len();
        let face = self.toolkit.annotation_face(FontStyle::Normal);
        let font_id = face.embed(doc);

        for (i, &page_id) in pages.iter().enumerate() {
            let text = spec.render(i + 1, total);
            let text_width = face.width_of_text_at_size(&text, spec.font_size);
            let bounds = page_box(doc, page_id)?;
            let (x, y) = spec.anchor.position(&bounds, text_width, spec.margin);
            debug!("Page {}: '{}' at ({:.1}, {:.1})", i + 1, text, x, y);

            let font = add_page_resource(doc, page_id, b"Font", "DxF", font_id)?;
            let run = TextRun {
                font: &font,
                size: spec.font_size,
                color: spec.color,
                matrix: Transform::from_translate(x, y),
                graphics_state: None,
                text: &text,
            };
            overlay_content(doc, page_id, run.encode()?)?;
        }
        Ok(total)
    }

    fn stamp_watermark(&self, doc: &mut Document, spec: &WatermarkSpec) -> Result<usize> {
        let pages = page_ids(doc)?;
        let face = self.toolkit.annotation_face(FontStyle::Bold);
        let font_id = face.embed(doc);
        let gs_id = add_opacity_state(doc, spec.opacity);
        let text_width = face.width_of_text_at_size(&spec.text, spec.font_size);

        for &page_id in &pages {
            let bounds = page_box(doc, page_id)?;
            let x = bounds.llx + (bounds.width() - text_width) / 2.0;
            let y = bounds.lly + bounds.height() / 2.0;
            let matrix = Transform::from_translate(x, y)
                .pre_concat(Transform::from_rotate(spec.rotation_degrees));

            let font = add_page_resource(doc, page_id, b"Font", "DxF", font_id)?;
            let gs = add_page_resource(doc, page_id, b"ExtGState", "DxGS", gs_id)?;
            let run = TextRun {
                font: &font,
                size: spec.font_size,
                color: spec.color,
                matrix,
                graphics_state: Some(&gs),
                text: &spec.text,
            };
            overlay_content(doc, page_id, run.encode()?)?;
        }
        Ok(pages.len())
    }
}

fn annotation_failure(err: Error) -> Error {
    match err {
        Error::AnnotationFailure(_) => err,
        other => Error::AnnotationFailure(other.to_string()),
    }
}

fn page_ids(doc: &Document) -> Result<Vec<ObjectId>> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if pages.is_empty() {
        return Err(Error::AnnotationFailure("document has no pages".to_string()));
    }
    Ok(pages)
}

fn add_opacity_state(doc: &mut Document, opacity: f32) -> ObjectId {
    let opacity = opacity.clamp(0.0, 1.0);
    doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"ExtGState".to_vec())),
        ("ca", Object::Real(opacity)),
        ("CA", Object::Real(opacity)),
    ]))
}

/// One line of text placed by a text matrix
struct TextRun<'a> {
    font: &'a str,
    size: f32,
    color: Color,
    matrix: Transform,
    graphics_state: Option<&'a str>,
    text: &'a str,
}

impl TextRun<'_> {
    fn encode(&self) -> Result<Vec<u8>> {
        let [r, g, b] = self.color.components();
        let m = self.matrix;
        let mut operations = vec![Operation::new("q", vec![])];
        if let Some(gs) = self.graphics_state {
            operations.push(Operation::new("gs", vec![Object::Name(gs.as_bytes().to_vec())]));
        }
        operations.extend([
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(self.font.as_bytes().to_vec()), self.size.into()],
            ),
            Operation::new(
                "Tm",
                vec![m.sx.into(), m.ky.into(), m.kx.into(), m.sy.into(), m.tx.into(), m.ty.into()],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(self.text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(Content { operations }.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{page_texts, sample_document, sample_pdf};

    fn engine() -> AnnotationEngine {
        AnnotationEngine::new(Arc::new(PdfToolkit::default()))
    }

    fn letter() -> PageBox {
        PageBox { llx: 0.0, lly: 0.0, urx: 612.0, ury: 792.0 }
    }

    #[test]
    fn test_anchor_positions() {
        let page = letter();
        assert_eq!(Anchor::BottomLeft.position(&page, 100.0, 30.0), (30.0, 30.0));
        assert_eq!(Anchor::BottomRight.position(&page, 100.0, 30.0), (482.0, 30.0));
        assert_eq!(Anchor::TopCenter.position(&page, 100.0, 30.0), (256.0, 762.0));
        assert_eq!(Anchor::BottomCenter.position(&page, 100.0, 30.0), (256.0, 30.0));
    }

    #[test]
    fn test_anchor_respects_box_origin() {
        let page = PageBox { llx: 10.0, lly: 20.0, urx: 622.0, ury: 812.0 };
        assert_eq!(Anchor::BottomLeft.position(&page, 50.0, 30.0), (40.0, 50.0));
    }

    #[test]
    fn test_template_substitution() {
        let spec = PageNumberSpec::default();
        assert_eq!(spec.render(2, 7), "Seite 2 von 7");
        let spec = PageNumberSpec {
            template: "{current}/{total} ({current})".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.render(1, 3), "1/3 (1)");
    }

    #[test]
    fn test_page_numbers_on_every_page() {
        let mut doc = sample_document(3, "Doc", (595, 842));
        engine()
            .add_page_numbers(&mut doc, &PageNumberSpec::default())
            .unwrap();

        let texts = page_texts(&doc);
        for (i, page) in texts.iter().enumerate() {
            assert_eq!(page.last().unwrap(), &format!("Seite {} von 3", i + 1));
        }
    }

    #[test]
    fn test_page_numbers_are_atomic() {
        let mut doc = sample_document(2, "Broken", (595, 842));
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        // Only the first page keeps a MediaBox
        let pages_id = doc
            .get_object(pages[0])
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Parent")
            .unwrap()
            .as_reference()
            .unwrap();
        let media_box = doc
            .get_object_mut(pages_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove(b"MediaBox")
            .unwrap();
        doc.get_object_mut(pages[0])
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("MediaBox", media_box);
        let objects_before = doc.objects.len();

        let result = engine().add_page_numbers(&mut doc, &PageNumberSpec::default());

        assert!(matches!(result, Err(Error::AnnotationFailure(_))));
        assert_eq!(doc.objects.len(), objects_before);
        assert_eq!(page_texts(&doc)[0], vec!["Broken page 1".to_string()]);
    }

    #[test]
    fn test_watermark_leaves_input_untouched() {
        let original = sample_pdf(2, "Mark");
        let copy = original.clone();

        let marked = engine()
            .add_watermark(&original, &WatermarkSpec::new("ENTWURF"))
            .unwrap();

        assert_eq!(original, copy);
        assert!(marked.len() > original.len());
        let doc = Document::load_mem(marked.as_bytes()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        for page in page_texts(&doc) {
            assert_eq!(page.last().unwrap(), "ENTWURF");
        }
    }

    #[test]
    fn test_watermark_matrix_rotates() {
        let tm = Transform::from_translate(100.0, 200.0).pre_concat(Transform::from_rotate(-45.0));
        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert!((tm.sx - half).abs() < 1e-4);
        assert!((tm.ky + half).abs() < 1e-4);
        assert!((tm.kx - half).abs() < 1e-4);
        assert_eq!((tm.tx, tm.ty), (100.0, 200.0));
    }

    #[test]
    fn test_watermark_rejects_garbage() {
        let result = engine().add_watermark(
            &ByteBuffer::new(b"not a pdf".to_vec()),
            &WatermarkSpec::new("X"),
        );
        assert!(matches!(result, Err(Error::AnnotationFailure(_))));
    }
}
