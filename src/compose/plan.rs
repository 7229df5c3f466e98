//! A composed document described as data
//!
//! ```json
//! {
//!   "settings": { "title": "Anschreiben", "margin": 25 },
//!   "blocks": [
//!     { "type": "text", "text": "Sehr geehrte Damen und Herren,", "font_size": 12 },
//!     { "type": "spacer", "height": 5 },
//!     { "type": "image", "source": "signature.png", "width": 40, "height": 15 },
//!     { "type": "page-break" }
//!   ]
//! }
//! ```
//!
//! Blocks flow top to bottom from the top margin. Text wraps to the content
//! width unless it sets `max_width`, and a block that would cross the bottom
//! margin starts a new page.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::images::{ImageOptions, ImageSource};
use super::{ComposerOverrides, TextDocument, TextOptions, VectorBuilder};
use crate::buffer::ByteBuffer;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPlan {
    #[serde(default)]
    pub settings: ComposerOverrides,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Block {
    Text {
        text: String,
        /// Left edge; defaults to the margin
        #[serde(default)]
        x: Option<f64>,
        /// Extra space after the block, in document units
        #[serde(default)]
        spacing_after: f64,
        #[serde(flatten)]
        options: TextOptions,
    },
    Image {
        /// Data URL, http(s) URL or file path
        source: String,
        width: f64,
        height: f64,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        spacing_after: f64,
        #[serde(flatten)]
        options: ImageOptions,
    },
    Spacer {
        height: f64,
    },
    PageBreak,
}

impl DocumentPlan {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Lay out every block and serialize the result
    pub async fn render(&self, builder: &VectorBuilder) -> Result<ByteBuffer> {
        let mut doc = builder.create_document(&self.settings);
        let mut cursor = Cursor::new(&doc);

        for (index, block) in self.blocks.iter().enumerate() {
            match block {
                Block::Text {
                    text,
                    x,
                    spacing_after,
                    options,
                } => {
                    let mut options = options.clone();
                    if options.max_width.is_none() {
                        let indent = x.map_or(0.0, |x| x - cursor.left);
                        options.max_width = Some(cursor.content_width - indent);
                    }
                    let line_height = doc.line_height(&options);
                    let lines = doc.split_lines(text, &options).len();
                    cursor.reserve(&mut doc, lines as f64 * line_height);

                    // The first baseline sits one font size below the block top
                    let ratio = options.line_height.unwrap_or(doc.config().default_line_height);
                    let ascent = line_height / ratio;
                    let left = x.unwrap_or(cursor.left);
                    let next = doc.render_text(text, left, cursor.y + ascent, &options);
                    cursor.y = next - ascent + spacing_after;
                }
                Block::Image {
                    source,
                    width,
                    height,
                    x,
                    spacing_after,
                    options,
                } => {
                    cursor.reserve(&mut doc, *height);
                    let placed = doc
                        .add_image(
                            &ImageSource::parse(source),
                            x.unwrap_or(cursor.left),
                            cursor.y,
                            *width,
                            *height,
                            options,
                        )
                        .await;
                    if placed {
                        cursor.y += height + spacing_after;
                    } else {
                        debug!("Block {}: image left out, no space reserved", index);
                    }
                }
                Block::Spacer { height } => cursor.y += height,
                Block::PageBreak => cursor.new_page(&mut doc),
            }
        }

        doc.finish()
    }
}

/// Vertical flow position on the current page
struct Cursor {
    left: f64,
    top: f64,
    bottom: f64,
    content_width: f64,
    y: f64,
}

impl Cursor {
    fn new(doc: &TextDocument) -> Self {
        let (_, height) = doc.page_size();
        let margin = doc.config().margin;
        Self {
            left: margin,
            top: margin,
            bottom: height - margin,
            content_width: doc.content_width(),
            y: margin,
        }
    }

    fn new_page(&mut self, doc: &mut TextDocument) {
        doc.add_page();
        self.y = self.top;
    }

    /// Break the page if `height` does not fit below the cursor. A block
    /// taller than a whole page is placed anyway.
    fn reserve(&mut self, doc: &mut TextDocument, height: f64) {
        if self.y + height > self.bottom && self.y > self.top {
            self.new_page(doc);
        }
    }
}
