//! One production run from content to finished buffer
//!
//! ```text
//! Idle -> LoadingCapabilities -> Producing -> [Merging] -> [Annotating] -> [Compressing] -> Done
//!                                                                                         \-> Failed
//! ```
//!
//! Stages run strictly in order and a failed run is never resumed; the
//! caller submits the whole request again. Separate runs on one [`Engine`]
//! share only the provider cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::buffer::{ByteBuffer, PdfInput};
use crate::compose::DocumentPlan;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::export;
use crate::loader::{CapabilityLoader, DefaultProviderFactory, ProviderFactory, ProviderKind};
use crate::markup::{MarkupNode, RasterOptions};
use crate::pdf::{
    compress, count_pages, AnnotationEngine, Bookmark, CompressionProfile, DocumentMetadata,
    MergeEngine, MergeOptions, MergeSource, PageNumberSpec, WatermarkSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    LoadingCapabilities,
    Producing,
    Merging,
    Annotating,
    Compressing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `next` may directly follow `self`
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, LoadingCapabilities)
                | (LoadingCapabilities, Producing)
                | (Producing, Merging | Annotating | Compressing | Done)
                | (Merging, Annotating | Compressing | Done)
                | (Annotating, Compressing | Done)
                | (Compressing, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the primary document comes from
#[derive(Debug)]
pub enum Production {
    /// Laid out by the vector text composer
    Compose(DocumentPlan),
    /// Rendered by the markup rasterizer
    Markup { node: MarkupNode, options: RasterOptions },
    /// Supplied ready-made
    Buffer(ByteBuffer),
}

impl Production {
    fn provider(&self) -> Option<ProviderKind> {
        match self {
            Production::Compose(_) => Some(ProviderKind::VectorBuilder),
            Production::Markup { .. } => Some(ProviderKind::MarkupRasterizer),
            Production::Buffer(_) => None,
        }
    }

    fn metadata(&self) -> DocumentMetadata {
        match self {
            Production::Compose(plan) => plan.settings.metadata(),
            Production::Markup { node, .. } => DocumentMetadata {
                title: node.title.clone(),
                ..Default::default()
            },
            Production::Buffer(_) => DocumentMetadata::default(),
        }
    }
}

#[derive(Debug)]
pub struct PipelineRequest {
    pub production: Production,
    /// Bookmark title of the primary document when attachments are merged
    pub display_name: Option<String>,
    /// Appended after the primary document, in order
    pub attachments: Vec<MergeSource>,
    pub merge_options: MergeOptions,
    pub watermark: Option<WatermarkSpec>,
    pub page_numbers: Option<PageNumberSpec>,
    pub compression: Option<CompressionProfile>,
}

impl PipelineRequest {
    pub fn new(production: Production) -> Self {
        Self {
            production,
            display_name: None,
            attachments: Vec::new(),
            merge_options: MergeOptions::default(),
            watermark: None,
            page_numbers: None,
            compression: None,
        }
    }

    fn needs_toolkit(&self) -> bool {
        !self.attachments.is_empty()
            || self.watermark.is_some()
            || self.page_numbers.is_some()
            || self.merge_options.add_page_numbers
            || !self.merge_options.metadata.is_empty()
    }

    fn providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.production.provider().into_iter().collect();
        if self.needs_toolkit() {
            kinds.push(ProviderKind::PdfManipulation);
        }
        kinds
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub buffer: ByteBuffer,
    pub page_count: usize,
    /// Empty unless attachments were merged
    pub bookmarks: Vec<Bookmark>,
    /// Every state the run passed through, starting at `Idle`
    pub states: Vec<PipelineState>,
}

/// Records the state sequence of one run
struct Progress {
    states: Vec<PipelineState>,
}

impl Progress {
    fn new() -> Self {
        Self {
            states: vec![PipelineState::Idle],
        }
    }

    fn current(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.current().can_advance_to(next),
            "{} -> {}",
            self.current(),
            next
        );
        debug!("Pipeline {} -> {}", self.current(), next);
        self.states.push(next);
    }
}

/// Holds the configuration and provider cache shared by every run
pub struct Engine<F = DefaultProviderFactory> {
    config: Arc<EngineConfig>,
    loader: CapabilityLoader<F>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let factory = DefaultProviderFactory::new(config.clone());
        Self {
            loader: CapabilityLoader::new(factory),
            config,
        }
    }
}

impl<F: ProviderFactory> Engine<F> {
    pub fn with_factory(config: EngineConfig, factory: F) -> Self {
        Self {
            config: Arc::new(config),
            loader: CapabilityLoader::new(factory),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader(&self) -> &CapabilityLoader<F> {
        &self.loader
    }

    /// Write a finished buffer into `dir`, falling back to the configured filename
    pub fn save(&self, buffer: &ByteBuffer, filename: Option<&str>, dir: &Path) -> Result<PathBuf> {
        let name = filename.unwrap_or(&self.config.export.default_filename);
        export::download(buffer, Some(name), dir)
    }

    /// Run `request` to completion or failure
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput> {
        let mut progress = Progress::new();
        match self.execute(request, &mut progress).await {
            Ok((buffer, page_count, bookmarks)) => {
                progress.advance(PipelineState::Done);
                info!("Pipeline done: {} pages, {} bytes", page_count, buffer.len());
                Ok(PipelineOutput {
                    buffer,
                    page_count,
                    bookmarks,
                    states: progress.states,
                })
            }
            Err(err) => {
                warn!("Pipeline failed while {}: {}", progress.current(), err);
                progress.advance(PipelineState::Failed);
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: PipelineRequest,
        progress: &mut Progress,
    ) -> Result<(ByteBuffer, usize, Vec<Bookmark>)> {
        progress.advance(PipelineState::LoadingCapabilities);
        let kinds = request.providers();
        try_join_all(kinds.iter().map(|&kind| self.loader.acquire(kind))).await?;

        let PipelineRequest {
            production,
            display_name,
            attachments,
            mut merge_options,
            watermark,
            page_numbers,
            compression,
        } = request;

        // A merged document is rebuilt from scratch, so it takes over the
        // primary document's properties unless the caller set its own
        let caller_metadata = !merge_options.metadata.is_empty();
        if !caller_metadata {
            merge_options.metadata = production.metadata();
        }

        progress.advance(PipelineState::Producing);
        let mut buffer = match production {
            Production::Compose(plan) => {
                let builder = self.loader.vector_builder().await?;
                plan.render(&builder).await?
            }
            Production::Markup { node, options } => {
                let rasterizer = self.loader.rasterizer().await?;
                rasterizer.render(&node, &options).await?
            }
            Production::Buffer(buffer) => buffer,
        };

        let mut bookmarks = Vec::new();
        if !attachments.is_empty() {
            progress.advance(PipelineState::Merging);
            let toolkit = self.loader.pdf_toolkit().await?;
            let primary = MergeSource {
                input: PdfInput::Raw(buffer),
                display_name,
            };
            let mut sources = Vec::with_capacity(attachments.len() + 1);
            sources.push(primary);
            sources.extend(attachments);
            // Numbering belongs to the annotation stage when one is requested
            if page_numbers.is_some() {
                merge_options.add_page_numbers = false;
            }
            let merged = MergeEngine::new(toolkit).merge_pdfs(sources, &merge_options)?;
            buffer = merged.buffer;
            bookmarks = merged.bookmarks;
        } else if caller_metadata {
            let toolkit = self.loader.pdf_toolkit().await?;
            let mut doc = toolkit.load(&buffer)?;
            merge_options.metadata.apply(&mut doc)?;
            buffer = toolkit.save(&mut doc)?;
        }

        if watermark.is_some() || page_numbers.is_some() {
            progress.advance(PipelineState::Annotating);
            let toolkit = self.loader.pdf_toolkit().await?;
            let annotator = AnnotationEngine::new(toolkit.clone());
            if let Some(spec) = &watermark {
                buffer = annotator.add_watermark(&buffer, spec)?;
            }
            if let Some(spec) = &page_numbers {
                let mut doc = toolkit.load(&buffer)?;
                annotator.add_page_numbers(&mut doc, spec)?;
                buffer = toolkit.save(&mut doc)?;
            }
        }

        if let Some(profile) = compression {
            progress.advance(PipelineState::Compressing);
            buffer = compress(&buffer, profile);
        }

        let page_count = count_pages(&buffer)?;
        Ok((buffer, page_count, bookmarks))
    }
}
