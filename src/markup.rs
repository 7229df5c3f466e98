//! Markup-to-PDF fallback through an external rasterizer
//!
//! The rasterizer is a command with wkhtmltopdf's flag conventions. The
//! markup is written to a scratch directory, converted, and the resulting
//! file read back; the directory is removed when rendering returns.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::buffer::ByteBuffer;
use crate::config::RasterizerConfig;
use crate::error::{Error, Result};
use crate::layout::{Orientation, PageFormat};
use crate::loader::ProviderKind;

/// A fully structured content node handed over by an upstream editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkupNode {
    /// An HTML fragment or a complete document
    pub html: String,
    pub title: Option<String>,
}

impl MarkupNode {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            title: None,
        }
    }

    /// The markup as a standalone UTF-8 document
    pub fn document(&self) -> String {
        if self.html.to_ascii_lowercase().contains("<html") {
            return self.html.clone();
        }
        let title = self.title.as_deref().map(escape_html).unwrap_or_default();
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            title, self.html
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    pub page_format: PageFormat,
    pub orientation: Orientation,
    pub margin_mm: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            margin_mm: 20.0,
        }
    }
}

/// The markup-rasterization provider
#[derive(Debug, Clone)]
pub struct MarkupRasterizer {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl MarkupRasterizer {
    /// Resolve the configured command to an executable
    pub fn locate(config: &RasterizerConfig) -> Result<Self> {
        let program = find_executable(&config.command).ok_or_else(|| Error::ProviderUnavailable {
            kind: ProviderKind::MarkupRasterizer,
            reason: format!("'{}' not found", config.command),
        })?;
        debug!("Using rasterizer {}", program.display());
        Ok(Self {
            program,
            extra_args: config.extra_args.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line flags for one render, without the input and output paths
    pub fn arguments(&self, node: &MarkupNode, options: &RasterOptions) -> Vec<OsString> {
        let margin = format!("{}mm", options.margin_mm);
        let mut args: Vec<OsString> = vec![
            "--quiet".into(),
            "--encoding".into(),
            "utf-8".into(),
            "--page-size".into(),
            options.page_format.name().into(),
            "--orientation".into(),
            options.orientation.name().into(),
        ];
        for side in ["--margin-top", "--margin-right", "--margin-bottom", "--margin-left"] {
            args.push(side.into());
            args.push(margin.clone().into());
        }
        if let Some(title) = &node.title {
            args.push("--title".into());
            args.push(title.into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Convert `node` to PDF bytes
    pub async fn render(&self, node: &MarkupNode, options: &RasterOptions) -> Result<ByteBuffer> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("document.html");
        let output = scratch.path().join("document.pdf");
        tokio::fs::write(&input, node.document()).await?;

        debug!("Rendering {} with {}", input.display(), self.program().display());
        let result = Command::new(self.program())
            .args(self.arguments(node, options))
            .arg(&input)
            .arg(&output)
            .output()
            .await
            .map_err(|e| {
                Error::Markup(format!("could not run {}: {}", self.program().display(), e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Markup(format!(
                "{} exited with {}: {}",
                self.program().display(),
                result.status,
                stderr.trim()
            )));
        }

        let buffer = ByteBuffer::new(tokio::fs::read(&output).await?);
        if !buffer.looks_like_pdf() {
            return Err(Error::Markup("rasterizer output is not a PDF".to_string()));
        }
        info!("Rasterized markup: {} bytes", buffer.len());
        Ok(buffer)
    }
}

/// An explicit path is taken as is; a bare name is searched on `PATH`
fn find_executable(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search).find_map(|dir| {
        let candidate = dir.join(command);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = candidate.with_extension("exe");
        exe.is_file().then_some(exe)
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rasterizer() -> MarkupRasterizer {
        MarkupRasterizer {
            program: PathBuf::from("wkhtmltopdf"),
            extra_args: vec!["--no-outline".to_string()],
        }
    }

    #[test]
    fn test_fragment_is_wrapped() {
        let node = MarkupNode {
            html: "<p>Hallo</p>".to_string(),
            title: Some("CV & Anschreiben".to_string()),
        };
        let doc = node.document();
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>CV &amp; Anschreiben</title>"));
        assert!(doc.contains("<p>Hallo</p>"));
    }

    #[test]
    fn test_complete_document_is_kept() {
        let node = MarkupNode::new("<HTML><body>x</body></HTML>");
        assert_eq!(node.document(), "<HTML><body>x</body></HTML>");
    }

    #[test]
    fn test_arguments() {
        let options = RasterOptions {
            page_format: PageFormat::Letter,
            orientation: Orientation::Landscape,
            margin_mm: 15.0,
        };
        let args: Vec<String> = rasterizer()
            .arguments(&MarkupNode::new("<p/>"), &options)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let pair = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(pair("--page-size"), "Letter");
        assert_eq!(pair("--orientation"), "Landscape");
        assert_eq!(pair("--margin-left"), "15mm");
        assert_eq!(args.last().unwrap(), "--no-outline");
        assert!(!args.contains(&"--title".to_string()));
    }

    #[test]
    fn test_missing_command_is_unavailable() {
        let config = RasterizerConfig {
            command: "definitely-not-a-rasterizer-7f3a".to_string(),
            extra_args: Vec::new(),
        };
        let err = MarkupRasterizer::locate(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::ProviderUnavailable {
                kind: ProviderKind::MarkupRasterizer,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_render_names_resolved_program() {
        let config = RasterizerConfig {
            command: "false".to_string(),
            extra_args: Vec::new(),
        };
        let rasterizer = MarkupRasterizer::locate(&config).unwrap();
        assert!(rasterizer.program().is_absolute());
        assert!(rasterizer.program().ends_with("false"));

        let err = rasterizer
            .render(&MarkupNode::new("<p>Hallo</p>"), &RasterOptions::default())
            .await
            .unwrap_err();
        let expected = rasterizer.program().display().to_string();
        assert!(matches!(&err, Error::Markup(msg) if msg.starts_with(&expected)), "{}", err);
    }
}
