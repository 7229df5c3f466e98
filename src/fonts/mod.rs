//! Font metrics and font resources
//!
//! Every font is drawn as a simple font with WinAnsiEncoding, so measuring a
//! string is a sum over its encoded bytes. Both the built-in standard fonts
//! and custom TrueType families go through [`FontMetrics`].

pub mod encoding;
pub mod standard;
pub mod truetype;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FontFamilyConfig;
use crate::error::{Error, Result};

pub use encoding::{decode_win_ansi, encode_win_ansi};
pub use standard::StandardFont;
pub use truetype::TrueTypeFont;

/// Family used whenever a requested one is unknown
pub const DEFAULT_FAMILY: &str = "helvetica";

/// Width measurement for a simple font
pub trait FontMetrics {
    /// Advance of one WinAnsi code in 1/1000ths of the em square
    fn code_width(&self, code: u8) -> u16;

    /// Width of `text` in points when set at `size` points
    fn width_of_text_at_size(&self, text: &str, size: f32) -> f32 {
        let units: u32 = encode_win_ansi(text)
            .into_iter()
            .map(|code| u32::from(self.code_width(code)))
            .sum();
        units as f32 * size / 1000.0
    }
}

/// Font style requested by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Bold,
    Italic,
    #[serde(alias = "bold-italic")]
    BoldItalic,
}

impl FromStr for FontStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "regular" => Ok(FontStyle::Normal),
            "bold" => Ok(FontStyle::Bold),
            "italic" | "oblique" => Ok(FontStyle::Italic),
            "bolditalic" | "bold-italic" => Ok(FontStyle::BoldItalic),
            other => Err(Error::Font(format!("Unknown font style: {}", other))),
        }
    }
}

/// One concrete face: a standard font or an embedded TrueType program
#[derive(Debug, Clone)]
pub enum FontFace {
    Standard(StandardFont),
    TrueType(Arc<TrueTypeFont>),
}

impl FontFace {
    pub fn base_font(&self) -> &str {
        match self {
            FontFace::Standard(font) => font.base_font(),
            FontFace::TrueType(font) => font.name(),
        }
    }

    /// Add the font's objects to `doc` and return the font dictionary id
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        match self {
            FontFace::Standard(font) => font.embed(doc),
            FontFace::TrueType(font) => font.embed(doc),
        }
    }
}

impl FontMetrics for FontFace {
    fn code_width(&self, code: u8) -> u16 {
        match self {
            FontFace::Standard(font) => font.code_width(code),
            FontFace::TrueType(font) => font.code_width(code),
        }
    }
}

/// The four styles of one family
#[derive(Debug, Clone)]
pub struct FontSet {
    pub regular: FontFace,
    pub bold: FontFace,
    pub italic: FontFace,
    pub bold_italic: FontFace,
}

impl FontSet {
    pub fn helvetica() -> Self {
        Self::standard(StandardFont::helvetica)
    }

    pub fn courier() -> Self {
        Self::standard(StandardFont::courier)
    }

    fn standard(pick: fn(FontStyle) -> StandardFont) -> Self {
        Self {
            regular: FontFace::Standard(pick(FontStyle::Normal)),
            bold: FontFace::Standard(pick(FontStyle::Bold)),
            italic: FontFace::Standard(pick(FontStyle::Italic)),
            bold_italic: FontFace::Standard(pick(FontStyle::BoldItalic)),
        }
    }

    /// Load a custom family; styles without a file reuse the regular face
    pub fn load(config: &FontFamilyConfig) -> Result<Self> {
        let load = |suffix: &str, path: &std::path::Path| -> Result<FontFace> {
            let name = format!("{}-{}", config.name, suffix);
            debug!("Loading font {} from {}", name, path.display());
            Ok(FontFace::TrueType(Arc::new(TrueTypeFont::from_file(&name, path)?)))
        };
        let regular = load("Regular", &config.regular)?;
        let optional = |suffix: &str, path: &Option<std::path::PathBuf>| -> Result<FontFace> {
            match path {
                Some(path) => load(suffix, path),
                None => Ok(regular.clone()),
            }
        };
        Ok(Self {
            bold: optional("Bold", &config.bold)?,
            italic: optional("Italic", &config.italic)?,
            bold_italic: optional("BoldItalic", &config.bold_italic)?,
            regular: regular.clone(),
        })
    }

    pub fn face(&self, style: FontStyle) -> &FontFace {
        match style {
            FontStyle::Normal => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
            FontStyle::BoldItalic => &self.bold_italic,
        }
    }
}

/// All families available to composers and annotators
#[derive(Debug, Clone)]
pub struct FontLibrary {
    families: BTreeMap<String, FontSet>,
}

impl FontLibrary {
    /// Standard families only
    pub fn builtin() -> Self {
        let mut families = BTreeMap::new();
        families.insert(DEFAULT_FAMILY.to_string(), FontSet::helvetica());
        families.insert("courier".to_string(), FontSet::courier());
        Self { families }
    }

    /// Standard families plus the configured TrueType families
    pub fn load(custom: &[FontFamilyConfig]) -> Result<Self> {
        let mut library = Self::builtin();
        for family in custom {
            let set = FontSet::load(family)?;
            library.families.insert(family.name.to_ascii_lowercase(), set);
        }
        Ok(library)
    }

    pub fn get(&self, family: &str) -> Option<&FontSet> {
        self.families.get(&family.to_ascii_lowercase())
    }

    /// Look up a family, falling back to Helvetica
    pub fn resolve(&self, family: &str) -> &FontSet {
        match self.get(family) {
            Some(set) => set,
            None => {
                warn!("Unknown font family '{}', using {}", family, DEFAULT_FAMILY);
                &self.families[DEFAULT_FAMILY]
            }
        }
    }

    pub fn family_names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}
