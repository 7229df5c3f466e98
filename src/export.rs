//! Preview and download of finished documents
//!
//! A preview lives in a temporary file that is removed when its
//! [`PreviewHandle`] is closed or dropped. A download is staged in the target
//! directory and only renamed into place once fully written.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::buffer::{to_data_url, ByteBuffer};
use crate::error::{Error, Result};

/// Filename used when the caller does not supply one
pub const DEFAULT_FILENAME: &str = "dokument.pdf";

#[derive(Debug, Clone)]
pub struct PresentOptions {
    /// Hand the preview file to the system viewer
    pub open_viewer: bool,
    /// Prefix of the temporary file name
    pub file_stem: String,
}

impl Default for PresentOptions {
    fn default() -> Self {
        Self {
            open_viewer: false,
            file_stem: "preview".to_string(),
        }
    }
}

/// An ephemeral, viewable copy of a document
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
    buffer: ByteBuffer,
}

impl PreviewHandle {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    /// The document as an inline `data:application/pdf` URL
    pub fn data_url(&self) -> String {
        to_data_url("application/pdf", self.buffer.as_bytes())
    }

    /// Remove the preview file now instead of on drop
    pub fn close(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Closed preview {}", path.display());
        Ok(())
    }
}

/// Write `buffer` to a temporary file and optionally show it
pub fn present(buffer: &ByteBuffer, options: &PresentOptions) -> Result<PreviewHandle> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}-", options.file_stem))
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(buffer.as_bytes())?;
    file.flush()?;
    debug!("Preview written to {}", file.path().display());

    if options.open_viewer {
        open_in_viewer(file.path())?;
    }

    Ok(PreviewHandle {
        file,
        buffer: buffer.clone(),
    })
}

/// Save `buffer` into `dir` under `filename` (default `dokument.pdf`)
pub fn download(buffer: &ByteBuffer, filename: Option<&str>, dir: &Path) -> Result<PathBuf> {
    let name = sanitize_filename(filename.unwrap_or(DEFAULT_FILENAME));
    let target = dir.join(&name);

    // The staging file is deleted if anything below fails
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(buffer.as_bytes())?;
    staged.flush()?;
    staged
        .persist(&target)
        .map_err(|e| Error::Io(e.error))?;

    info!("Saved {} bytes to {}", buffer.len(), target.display());
    Ok(target)
}

/// Strip path separators and control characters, then ensure a `.pdf` suffix
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let stem = if cleaned.is_empty() {
        DEFAULT_FILENAME
    } else {
        cleaned
    };
    if stem.to_ascii_lowercase().ends_with(".pdf") {
        stem.to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

/// Open a file with the system default application
pub fn open_in_viewer(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        tracing::warn!("No viewer known for this platform; {} left in place", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ByteBuffer {
        ByteBuffer::new(b"%PDF-1.5\n%%EOF\n".to_vec())
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Lebenslauf"), "Lebenslauf.pdf");
        assert_eq!(sanitize_filename("CV.PDF"), "CV.PDF");
        assert_eq!(sanitize_filename("../etc/passwd"), "_etc_passwd.pdf");
        assert_eq!(sanitize_filename("  "), "dokument.pdf");
        assert_eq!(sanitize_filename("a:b?.pdf"), "a_b_.pdf");
    }

    #[test]
    fn test_download_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = download(&buffer(), None, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "dokument.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), buffer().into_vec());
        // Only the final file remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_download_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Anschreiben.pdf"), b"old").unwrap();
        let path = download(&buffer(), Some("Anschreiben"), dir.path()).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), buffer().into_vec());
    }

    #[test]
    fn test_preview_is_released() {
        let handle = present(&buffer(), &PresentOptions::default()).unwrap();
        let path = handle.path().to_path_buf();
        assert!(path.exists());
        assert!(handle.data_url().starts_with("data:application/pdf;base64,"));
        handle.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_preview_removed_on_drop() {
        let path = {
            let handle = present(&buffer(), &PresentOptions::default()).unwrap();
            handle.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
