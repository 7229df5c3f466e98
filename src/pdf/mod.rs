//! PDF manipulation module

pub mod annotate;
pub mod compress;
pub mod merge;
pub mod metadata;
pub mod page;
pub mod toolkit;

// Re-export commonly used items
pub use annotate::{Anchor, AnnotationEngine, PageNumberSpec, WatermarkSpec};
pub use compress::{compress, CompressionProfile};
pub use merge::{Bookmark, MergeEngine, MergeOptions, MergeOutput, MergeSource};
pub use metadata::{count_pages, inspect, DocumentMetadata, PdfInfo};
pub use page::PageBox;
pub use toolkit::PdfToolkit;
