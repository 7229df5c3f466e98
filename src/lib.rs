//! PDF Dossier Library
//!
//! Assembles application documents (CVs, cover letters, certificates) as PDF.
//! This library provides functionality to:
//! - Compose documents from wrapped text and images
//! - Render markup through an external rasterizer
//! - Merge PDFs with a bookmark per named source
//! - Stamp watermarks and running page numbers
//! - Re-encode documents under a compression profile
//! - Preview or save the result
//!
//! # Example
//!
//! ```no_run
//! use pdf_dossier::buffer::ByteBuffer;
//! use pdf_dossier::pdf::{MergeSource, PageNumberSpec};
//! use pdf_dossier::pipeline::{Engine, PipelineRequest, Production};
//! use pdf_dossier::EngineConfig;
//!
//! # async fn run() -> pdf_dossier::Result<()> {
//! let cv = ByteBuffer::new(std::fs::read("cv.pdf")?);
//! let certificate = std::fs::read("zeugnis.pdf")?;
//!
//! let mut request = PipelineRequest::new(Production::Buffer(cv));
//! request.display_name = Some("Lebenslauf".to_string());
//! request.attachments.push(MergeSource::named(certificate, "Zeugnis"));
//! request.page_numbers = Some(PageNumberSpec::default());
//!
//! let engine = Engine::new(EngineConfig::default());
//! let output = engine.run(request).await?;
//! engine.save(&output.buffer, None, std::path::Path::new("."))?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod color;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod fonts;
pub mod layout;
pub mod loader;
pub mod markup;
pub mod pdf;
pub mod pipeline;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use buffer::{ByteBuffer, PdfInput};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use pipeline::{Engine, PipelineRequest, Production};
