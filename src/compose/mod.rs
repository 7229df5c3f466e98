//! Vector text composer
//!
//! Builds documents from scratch: positioned, wrapped text runs and embedded
//! images. Coordinates are in the document unit with the origin at the top
//! left of the page, and a text `y` is the baseline of its first line.

pub mod images;
pub mod plan;
pub mod text;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::ByteBuffer;
use crate::color::{hex_to_rgb, Color};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::fonts::{encode_win_ansi, FontFace, FontLibrary, FontMetrics, FontStyle, DEFAULT_FAMILY};
use crate::layout::{line_height_mm, Length, Margins, Orientation, PageDimensions, PageFormat, Unit};
use crate::pdf::DocumentMetadata;

pub use images::{detect_format, ImageCompression, ImageFormat, ImageOptions, ImageSource};
pub use plan::{Block, DocumentPlan};
pub use text::split_text_to_size;

/// Defaults every composed document starts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub page_format: PageFormat,
    pub orientation: Orientation,
    pub unit: Unit,
    /// Page margin in document units
    pub margin: f64,
    /// Points
    pub default_font_size: f32,
    /// Multiple of the font size
    pub default_line_height: f64,
    pub default_font_family: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            unit: Unit::Mm,
            margin: 20.0,
            default_font_size: 11.0,
            default_line_height: 1.5,
            default_font_family: DEFAULT_FAMILY.to_string(),
        }
    }
}

/// Per-document settings layered over [`ComposerConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerOverrides {
    pub page_format: Option<PageFormat>,
    pub orientation: Option<Orientation>,
    pub unit: Option<Unit>,
    pub margin: Option<f64>,
    pub default_font_size: Option<f32>,
    pub default_line_height: Option<f64>,
    pub default_font_family: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
}

impl ComposerOverrides {
    pub fn apply(&self, defaults: &ComposerConfig) -> ComposerConfig {
        ComposerConfig {
            page_format: self.page_format.unwrap_or(defaults.page_format),
            orientation: self.orientation.unwrap_or(defaults.orientation),
            unit: self.unit.unwrap_or(defaults.unit),
            margin: self.margin.unwrap_or(defaults.margin),
            default_font_size: self.default_font_size.unwrap_or(defaults.default_font_size),
            default_line_height: self.default_line_height.unwrap_or(defaults.default_line_height),
            default_font_family: self
                .default_font_family
                .clone()
                .unwrap_or_else(|| defaults.default_font_family.clone()),
        }
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
            subject: self.subject.clone(),
            keywords: self.keywords.clone(),
            creation_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    /// Spread word spacing on every line but the last
    Justify,
}

/// How one text run is set; unset fields use the document defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    pub font_size: Option<f32>,
    pub font_style: FontStyle,
    pub font_family: Option<String>,
    /// `#rrggbb`; malformed values draw black
    pub color: Option<String>,
    /// Wrap width in document units
    pub max_width: Option<f64>,
    pub align: TextAlign,
    pub line_height: Option<f64>,
}

/// The vector document builder provider
#[derive(Debug, Clone)]
pub struct VectorBuilder {
    fonts: Arc<FontLibrary>,
    http: reqwest::Client,
    defaults: ComposerConfig,
}

impl VectorBuilder {
    pub fn new(
        fonts: Arc<FontLibrary>,
        http: &HttpConfig,
        defaults: ComposerConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .build()?;
        Ok(Self {
            fonts,
            http: client,
            defaults,
        })
    }

    pub fn defaults(&self) -> &ComposerConfig {
        &self.defaults
    }

    /// Start a one-page document with `overrides` merged over the defaults
    pub fn create_document(&self, overrides: &ComposerOverrides) -> TextDocument {
        let config = overrides.apply(&self.defaults);
        debug!(
            "New document: {} {}, unit {:?}, margin {}",
            config.page_format,
            config.orientation.name(),
            config.unit,
            config.margin
        );
        TextDocument::new(
            config,
            overrides.metadata(),
            self.fonts.clone(),
            self.http.clone(),
        )
    }
}

#[derive(Debug, Default)]
struct PageState {
    operations: Vec<Operation>,
}

/// A document under construction
pub struct TextDocument {
    config: ComposerConfig,
    metadata: DocumentMetadata,
    fonts: Arc<FontLibrary>,
    http: reqwest::Client,
    doc: Document,
    pages: Vec<PageState>,
    current: usize,
    /// Resource name and object per embedded base font
    font_resources: BTreeMap<String, (String, ObjectId)>,
    image_resources: BTreeMap<String, ObjectId>,
    page_width_pt: f64,
    page_height_pt: f64,
}

impl TextDocument {
    fn new(
        config: ComposerConfig,
        metadata: DocumentMetadata,
        fonts: Arc<FontLibrary>,
        http: reqwest::Client,
    ) -> Self {
        let dims = PageDimensions::new(config.page_format, config.orientation);
        Self {
            metadata,
            fonts,
            http,
            doc: Document::with_version("1.7"),
            pages: vec![PageState::default()],
            current: 0,
            font_resources: BTreeMap::new(),
            image_resources: BTreeMap::new(),
            page_width_pt: dims.width.pt(),
            page_height_pt: dims.height.pt(),
            config,
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Page size in document units
    pub fn page_size(&self) -> (f64, f64) {
        let k = self.k();
        (self.page_width_pt / k, self.page_height_pt / k)
    }

    pub fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.metadata = metadata;
    }

    /// Append a page and make it current
    pub fn add_page(&mut self) {
        self.pages.push(PageState::default());
        self.current = self.pages.len() - 1;
    }

    /// Make the 1-based page `number` current
    pub fn set_page(&mut self, number: usize) -> Result<()> {
        if number == 0 || number > self.pages.len() {
            return Err(Error::General(format!(
                "Page {} out of range (document has {})",
                number,
                self.pages.len()
            )));
        }
        self.current = number - 1;
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Points per document unit
    fn k(&self) -> f64 {
        self.config.unit.pt_per_unit()
    }

    fn face(&self, options: &TextOptions) -> FontFace {
        let family = options
            .font_family
            .as_deref()
            .unwrap_or(&self.config.default_font_family);
        self.fonts.resolve(family).face(options.font_style).clone()
    }

    /// Distance between baselines in document units
    pub fn line_height(&self, options: &TextOptions) -> f64 {
        let size = f64::from(options.font_size.unwrap_or(self.config.default_font_size));
        let ratio = options.line_height.unwrap_or(self.config.default_line_height);
        Length::from_mm(line_height_mm(size, ratio)).in_unit(self.config.unit)
    }

    /// Width between the side margins in document units
    pub fn content_width(&self) -> f64 {
        let unit = self.config.unit;
        let page = PageDimensions::new(self.config.page_format, self.config.orientation);
        Margins::uniform(Length::from_unit(self.config.margin, unit))
            .content_width(&page)
            .in_unit(unit)
    }

    /// Lines `text` occupies under `options`
    pub fn split_lines(&self, text: &str, options: &TextOptions) -> Vec<String> {
        let size = options.font_size.unwrap_or(self.config.default_font_size);
        match options.max_width {
            Some(width) => {
                split_text_to_size(&self.face(options), text, size, (width * self.k()) as f32)
            }
            None => text.split('\n').map(str::to_string).collect(),
        }
    }

    /// Draw `text` with its first baseline at `(x, y)`; returns the `y`
    /// below the last line so callers can chain blocks.
    pub fn render_text(&mut self, text: &str, x: f64, y: f64, options: &TextOptions) -> f64 {
        let face = self.face(options);
        let size = options.font_size.unwrap_or(self.config.default_font_size);
        let color: Color = options
            .color
            .as_deref()
            .map(|hex| hex_to_rgb(hex).into())
            .unwrap_or_default();
        let line_height = self.line_height(options);
        let lines = self.split_lines(text, options);
        let font = self.font_resource(&face);
        let k = self.k();
        let [r, g, b] = color.components();

        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let width = f64::from(face.width_of_text_at_size(line, size)) / k;
            let last = i + 1 == lines.len();
            let (line_x, word_spacing) = match (options.align, options.max_width) {
                (TextAlign::Left, _) => (x, None),
                (TextAlign::Center, Some(max)) => (x + (max - width) / 2.0, None),
                (TextAlign::Center, None) => (x - width / 2.0, None),
                (TextAlign::Right, Some(max)) => (x + max - width, None),
                (TextAlign::Right, None) => (x - width, None),
                (TextAlign::Justify, Some(max)) if !last => {
                    let gaps = line.matches(' ').count();
                    let spacing = (gaps > 0).then(|| (max - width) * k / gaps as f64);
                    (x, spacing)
                }
                (TextAlign::Justify, _) => (x, None),
            };
            let baseline = y + i as f64 * line_height;

            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(font.as_bytes().to_vec()), size.into()],
            ));
            operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
            // Tw outlives ET, so every line sets it, zero included
            let spacing = word_spacing.unwrap_or(0.0) as f32;
            operations.push(Operation::new("Tw", vec![spacing.into()]));
            operations.push(Operation::new(
                "Td",
                vec![
                    ((line_x * k) as f32).into(),
                    ((self.page_height_pt - baseline * k) as f32).into(),
                ],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        self.pages[self.current].operations.extend(operations);

        y + lines.len() as f64 * line_height
    }

    /// Place an image with its top-left corner at `(x, y)`, `w` by `h` units.
    ///
    /// A failed fetch or decode is logged and reported as `false`; the
    /// document stays usable.
    pub async fn add_image(
        &mut self,
        source: &ImageSource,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        options: &ImageOptions,
    ) -> bool {
        match self.try_add_image(source, x, y, w, h, options).await {
            Ok(name) => {
                debug!("Placed image {} on page {}", name, self.current + 1);
                true
            }
            Err(err) => {
                warn!("Image omitted: {}", err);
                false
            }
        }
    }

    async fn try_add_image(
        &mut self,
        source: &ImageSource,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        options: &ImageOptions,
    ) -> Result<String> {
        let bytes = source
            .fetch(&self.http)
            .await
            .map_err(|e| Error::ImageEmbed(e.to_string()))?;
        let format = options.format.unwrap_or_else(|| detect_format(&bytes));
        let image = images::EmbeddedImage::decode(&bytes, format, options.compression)?;
        let image_id = image.embed(&mut self.doc);

        let name = format!("Im{}", self.image_resources.len() + 1);
        self.image_resources.insert(name.clone(), image_id);

        let k = self.k();
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    ((w * k) as f32).into(),
                    0.into(),
                    0.into(),
                    ((h * k) as f32).into(),
                    ((x * k) as f32).into(),
                    ((self.page_height_pt - (y + h) * k) as f32).into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ];
        self.pages[self.current].operations.extend(operations);
        Ok(name)
    }

    fn font_resource(&mut self, face: &FontFace) -> String {
        if let Some((name, _)) = self.font_resources.get(face.base_font()) {
            return name.clone();
        }
        let name = format!("F{}", self.font_resources.len() + 1);
        let id = face.embed(&mut self.doc);
        self.font_resources
            .insert(face.base_font().to_string(), (name.clone(), id));
        name
    }

    /// Serialize the document
    pub fn finish(mut self) -> Result<ByteBuffer> {
        let pages_id = self.doc.new_object_id();

        let fonts = Dictionary::from_iter(
            self.font_resources
                .values()
                .map(|(name, id)| (name.as_str(), Object::Reference(*id))),
        );
        let xobjects = Dictionary::from_iter(
            self.image_resources
                .iter()
                .map(|(name, id)| (name.as_str(), Object::Reference(*id))),
        );
        let resources_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Font", Object::Dictionary(fonts)),
            ("XObject", Object::Dictionary(xobjects)),
        ]));

        let media_box = Object::Array(vec![
            0.into(),
            0.into(),
            (self.page_width_pt as f32).into(),
            (self.page_height_pt as f32).into(),
        ]);
        let mut kids = Vec::with_capacity(self.pages.len());
        for page in std::mem::take(&mut self.pages) {
            let content = Content {
                operations: page.operations,
            }
            .encode()?;
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&content)?;
            let content_id = self.doc.add_object(Stream::new(
                Dictionary::from_iter(vec![("Filter", Object::Name(b"FlateDecode".to_vec()))]),
                encoder.finish()?,
            ));
            let page_id = self.doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("MediaBox", media_box.clone()),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
            ]));
            kids.push(Object::Reference(page_id));
        }

        let page_count = kids.len();
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(page_count as i64)),
                ("Kids", Object::Array(kids)),
            ])),
        );
        let catalog_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.metadata.apply(&mut self.doc)?;

        let buffer = ByteBuffer::from_document(&mut self.doc)?;
        info!("Composed {} pages, {} bytes", page_count, buffer.len());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MM_PER_PT;
    use crate::pdf::inspect;
    use crate::pdf::page::as_number;
    use crate::testing::page_texts;

    fn builder() -> VectorBuilder {
        VectorBuilder::new(
            Arc::new(FontLibrary::builtin()),
            &HttpConfig::default(),
            ComposerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_overrides_merge_over_defaults() {
        let overrides = ComposerOverrides {
            page_format: Some(PageFormat::Letter),
            default_font_size: Some(12.0),
            ..Default::default()
        };
        let config = overrides.apply(&ComposerConfig::default());
        assert_eq!(config.page_format, PageFormat::Letter);
        assert_eq!(config.default_font_size, 12.0);
        assert_eq!(config.margin, 20.0);
        assert_eq!(config.unit, Unit::Mm);
    }

    #[test]
    fn test_line_height_in_millimetres() {
        let doc = builder().create_document(&ComposerOverrides::default());
        let options = TextOptions {
            font_size: Some(10.0),
            line_height: Some(1.5),
            ..Default::default()
        };
        assert!((doc.line_height(&options) - 10.0 * MM_PER_PT * 1.5).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_wrapped_text_advances_past_one_line() {
        let mut doc = builder().create_document(&ComposerOverrides::default());
        let options = TextOptions {
            max_width: Some(60.0),
            ..Default::default()
        };
        let text = "Mit großem Interesse habe ich Ihre Stellenanzeige gelesen \
                    und bewerbe mich hiermit.";
        let next = doc.render_text(text, 20.0, 30.0, &options);
        assert!(next > 30.0 + doc.line_height(&options));

        let single = doc.render_text("Kurz", 20.0, next, &TextOptions::default());
        assert!((single - next - doc.line_height(&TextOptions::default())).abs() < 1e-9);
    }

    /// Word spacing in effect for each `Tj`, in drawing order
    fn word_spacing_per_run(operations: &[Operation]) -> Vec<(String, f32)> {
        let mut current = 0.0;
        let mut runs = Vec::new();
        for op in operations {
            match op.operator.as_str() {
                "Tw" => current = op.operands.first().and_then(as_number).unwrap_or(0.0),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        runs.push((crate::fonts::decode_win_ansi(bytes), current));
                    }
                }
                _ => {}
            }
        }
        runs
    }

    #[test]
    fn test_justify_spacing_stops_at_last_line() {
        let mut doc = builder().create_document(&ComposerOverrides::default());
        let justified = TextOptions {
            max_width: Some(60.0),
            align: TextAlign::Justify,
            ..Default::default()
        };
        let text = "Mit großem Interesse habe ich Ihre Stellenanzeige gelesen \
                    und bewerbe mich hiermit.";
        let next = doc.render_text(text, 20.0, 30.0, &justified);
        doc.render_text("Danach linksbündig", 20.0, next, &TextOptions::default());

        let runs = word_spacing_per_run(&doc.pages[0].operations);
        let lines = doc.split_lines(text, &justified).len();
        assert!(lines >= 3, "{:?}", runs);
        assert!(runs[..lines - 1].iter().all(|(_, tw)| *tw > 0.0), "{:?}", runs);
        assert_eq!(runs[lines - 1].1, 0.0);
        let last = runs.last().map(|(t, tw)| (t.as_str(), *tw));
        assert_eq!(last, Some(("Danach linksbündig", 0.0)));
    }

    #[test]
    fn test_content_width_follows_margin_and_unit() {
        let doc = builder().create_document(&ComposerOverrides::default());
        assert!((doc.content_width() - 170.0).abs() < 1e-6);

        let inches = builder().create_document(&ComposerOverrides {
            page_format: Some(PageFormat::Letter),
            unit: Some(Unit::In),
            margin: Some(1.0),
            ..Default::default()
        });
        assert!((inches.content_width() - 6.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_finish_writes_pages_and_metadata() {
        let overrides = ComposerOverrides {
            title: Some("Lebenslauf".to_string()),
            ..Default::default()
        };
        let mut doc = builder().create_document(&overrides);
        doc.render_text("Seite eins", 20.0, 30.0, &TextOptions::default());
        doc.add_page();
        doc.render_text("Seite zwei", 20.0, 30.0, &TextOptions::default());
        doc.set_page(1).unwrap();
        doc.render_text("Nachtrag", 20.0, 40.0, &TextOptions::default());
        assert!(doc.set_page(3).is_err());

        let buffer = doc.finish().unwrap();
        let info = inspect(&buffer).unwrap();
        assert_eq!(info.page_count, 2);
        assert_eq!(info.title.as_deref(), Some("Lebenslauf"));

        let parsed = Document::load_mem(buffer.as_bytes()).unwrap();
        assert_eq!(
            page_texts(&parsed),
            vec![
                vec!["Seite eins".to_string(), "Nachtrag".to_string()],
                vec!["Seite zwei".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_add_image_reports_success_and_failure() {
        let mut doc = builder().create_document(&ComposerOverrides::default());
        let png = images::tests::png_bytes(true);
        assert!(
            doc.add_image(
                &ImageSource::Bytes(png),
                20.0,
                20.0,
                40.0,
                30.0,
                &ImageOptions::default()
            )
            .await
        );
        assert!(
            !doc.add_image(
                &ImageSource::Bytes(b"broken".to_vec()),
                20.0,
                60.0,
                40.0,
                30.0,
                &ImageOptions::default()
            )
            .await
        );
        let missing = ImageSource::File("no/such/image.png".into());
        assert!(!doc.add_image(&missing, 0.0, 0.0, 1.0, 1.0, &ImageOptions::default()).await);
        assert!(doc.finish().is_ok());
    }
}
