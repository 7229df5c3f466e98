//! Error types for the PDF dossier library

use thiserror::Error;

use crate::loader::ProviderKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF dossier library
#[derive(Error, Debug)]
pub enum Error {
    /// A capability provider could not be loaded. The next `acquire` retries.
    #[error("Provider unavailable ({kind}): {reason}")]
    ProviderUnavailable { kind: ProviderKind, reason: String },

    /// One merge input could not be decoded or parsed
    #[error("Merge source #{index} could not be decoded: {reason}")]
    SourceDecode { index: usize, reason: String },

    /// Whole-document stamping failed; nothing was applied
    #[error("Annotation failed: {0}")]
    AnnotationFailure(String),

    /// An image could not be fetched, decoded or embedded
    #[error("Image could not be embedded: {0}")]
    ImageEmbed(String),

    /// Payload larger than a caller-imposed limit (checked upstream, not here)
    #[error("Document of {size} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// No merge source produced any page
    #[error("No pages to merge: every source was empty or could not be decoded")]
    EmptyMerge,

    /// Markup rasterization failed
    #[error("Markup rendering failed: {0}")]
    Markup(String),

    /// Font error
    #[error("Font error: {0}")]
    Font(String),

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Base64 payload could not be decoded
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error while fetching a remote resource
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether re-invoking the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ProviderUnavailable { .. } | Error::Http(_))
    }
}
