//! Engine configuration
//!
//! One [`EngineConfig`] is handed to [`crate::pipeline::Engine`] and shared by
//! every pipeline it runs. Every section has defaults, so a config file only
//! needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compose::ComposerConfig;
use crate::error::{Error, Result};
use crate::export::DEFAULT_FILENAME;
use crate::fonts::DEFAULT_FAMILY;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults for documents built by the vector text composer
    pub composer: ComposerConfig,
    /// Extra TrueType families on top of the standard fonts
    pub fonts: Vec<FontFamilyConfig>,
    /// Family used for page numbers (regular) and watermarks (bold)
    pub annotation_font_family: String,
    pub rasterizer: RasterizerConfig,
    pub http: HttpConfig,
    pub export: ExportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            composer: ComposerConfig::default(),
            fonts: Vec::new(),
            annotation_font_family: DEFAULT_FAMILY.to_string(),
            rasterizer: RasterizerConfig::default(),
            http: HttpConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!("Config file not found: {}", path.display())));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let composer = &self.composer;
        if composer.default_font_size <= 0.0 {
            return Err(Error::Config("composer.default_font_size must be positive".to_string()));
        }
        if composer.default_line_height <= 0.0 {
            return Err(Error::Config("composer.default_line_height must be positive".to_string()));
        }
        if composer.margin < 0.0 {
            return Err(Error::Config("composer.margin must not be negative".to_string()));
        }
        if self.rasterizer.command.trim().is_empty() {
            return Err(Error::Config("rasterizer.command must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A custom TrueType family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontFamilyConfig {
    pub name: String,
    pub regular: PathBuf,
    #[serde(default)]
    pub bold: Option<PathBuf>,
    #[serde(default)]
    pub italic: Option<PathBuf>,
    #[serde(default)]
    pub bold_italic: Option<PathBuf>,
}

/// External markup-to-PDF command (wkhtmltopdf flag conventions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerConfig {
    pub command: String,
    pub extra_args: Vec<String>,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            command: "wkhtmltopdf".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Remote image fetching. No timeout is configured; the host defaults apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("pdf-dossier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub default_filename: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Orientation, PageFormat};

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.composer.page_format, PageFormat::A4);
        assert_eq!(config.composer.orientation, Orientation::Portrait);
        assert_eq!(config.composer.margin, 20.0);
        assert_eq!(config.annotation_font_family, "helvetica");
        assert_eq!(config.rasterizer.command, "wkhtmltopdf");
        assert_eq!(config.export.default_filename, "dokument.pdf");
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "composer": { "page_format": "letter", "default_font_size": 12 },
            "fonts": [{ "name": "Brand", "regular": "fonts/Brand.ttf" }]
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.composer.page_format, PageFormat::Letter);
        assert_eq!(config.composer.default_font_size, 12.0);
        assert_eq!(config.composer.default_line_height, 1.5);
        assert_eq!(config.fonts[0].bold, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let json = r#"{ "composer": { "default_font_size": 0 } }"#;
        assert!(matches!(EngineConfig::from_json(json), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let result = EngineConfig::from_file(Path::new("no/such/config.json"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
