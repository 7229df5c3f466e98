//! Lazy loading of capability providers
//!
//! Each [`ProviderKind`] has one cache slot. The first successful load fills
//! it and later calls reuse the handle. A failed load leaves the slot empty,
//! so the next call retries from scratch.
//!
//! The slot lock is not held while loading. Two first-time callers may both
//! load the same kind; the last one to finish wins the slot. Providers are
//! stateless, so the duplicate load only costs time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::compose::VectorBuilder;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fonts::FontLibrary;
use crate::markup::MarkupRasterizer;
use crate::pdf::PdfToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    VectorBuilder,
    PdfManipulation,
    MarkupRasterizer,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::VectorBuilder,
        ProviderKind::PdfManipulation,
        ProviderKind::MarkupRasterizer,
    ];

    fn slot(self) -> usize {
        match self {
            ProviderKind::VectorBuilder => 0,
            ProviderKind::PdfManipulation => 1,
            ProviderKind::MarkupRasterizer => 2,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::VectorBuilder => "vector-builder",
            ProviderKind::PdfManipulation => "pdf-manipulation",
            ProviderKind::MarkupRasterizer => "markup-rasterizer",
        })
    }
}

/// A loaded provider
#[derive(Debug, Clone)]
pub enum ProviderHandle {
    Vector(Arc<VectorBuilder>),
    Manipulation(Arc<PdfToolkit>),
    Rasterizer(Arc<MarkupRasterizer>),
}

impl ProviderHandle {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderHandle::Vector(_) => ProviderKind::VectorBuilder,
            ProviderHandle::Manipulation(_) => ProviderKind::PdfManipulation,
            ProviderHandle::Rasterizer(_) => ProviderKind::MarkupRasterizer,
        }
    }
}

/// Knows how to bring up each provider kind
pub trait ProviderFactory: Send + Sync {
    fn load(&self, kind: ProviderKind) -> BoxFuture<'_, Result<ProviderHandle>>;
}

/// Builds providers from an [`EngineConfig`]
pub struct DefaultProviderFactory {
    config: Arc<EngineConfig>,
}

impl DefaultProviderFactory {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    async fn font_library(&self) -> Result<Arc<FontLibrary>> {
        let families = self.config.fonts.clone();
        let library = tokio::task::spawn_blocking(move || FontLibrary::load(&families))
            .await
            .map_err(|e| Error::General(format!("font loading task failed: {}", e)))??;
        Ok(Arc::new(library))
    }

    async fn load_kind(&self, kind: ProviderKind) -> Result<ProviderHandle> {
        let config = &self.config;
        match kind {
            ProviderKind::VectorBuilder => {
                let fonts = self.font_library().await?;
                let builder = VectorBuilder::new(fonts, &config.http, config.composer.clone())?;
                Ok(ProviderHandle::Vector(Arc::new(builder)))
            }
            ProviderKind::PdfManipulation => {
                let fonts = self.font_library().await?;
                let toolkit = PdfToolkit::new(fonts, config.annotation_font_family.clone());
                Ok(ProviderHandle::Manipulation(Arc::new(toolkit)))
            }
            ProviderKind::MarkupRasterizer => {
                let rasterizer = MarkupRasterizer::locate(&config.rasterizer)?;
                Ok(ProviderHandle::Rasterizer(Arc::new(rasterizer)))
            }
        }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn load(&self, kind: ProviderKind) -> BoxFuture<'_, Result<ProviderHandle>> {
        Box::pin(self.load_kind(kind))
    }
}

pub struct CapabilityLoader<F = DefaultProviderFactory> {
    factory: F,
    slots: [Mutex<Option<ProviderHandle>>; 3],
}

impl<F: ProviderFactory> CapabilityLoader<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slots: Default::default(),
        }
    }

    fn slot(&self, kind: ProviderKind) -> MutexGuard<'_, Option<ProviderHandle>> {
        // The slot only ever holds a complete handle, so a poisoned lock is still usable
        self.slots[kind.slot()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_loaded(&self, kind: ProviderKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Return the cached handle for `kind`, loading it on first use
    pub async fn acquire(&self, kind: ProviderKind) -> Result<ProviderHandle> {
        let cached = self.slot(kind).clone();
        if let Some(handle) = cached {
            debug!("Provider {} already loaded", kind);
            return Ok(handle);
        }

        debug!("Loading provider {}", kind);
        match self.factory.load(kind).await {
            Ok(handle) if handle.kind() == kind => {
                *self.slot(kind) = Some(handle.clone());
                info!("Provider {} loaded", kind);
                Ok(handle)
            }
            Ok(handle) => Err(Error::ProviderUnavailable {
                kind,
                reason: format!("factory returned a {} provider", handle.kind()),
            }),
            Err(err) => {
                warn!("Provider {} failed to load: {}", kind, err);
                Err(match err {
                    Error::ProviderUnavailable { .. } => err,
                    other => Error::ProviderUnavailable {
                        kind,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    pub async fn vector_builder(&self) -> Result<Arc<VectorBuilder>> {
        match self.acquire(ProviderKind::VectorBuilder).await? {
            ProviderHandle::Vector(builder) => Ok(builder),
            other => Err(mismatch(ProviderKind::VectorBuilder, &other)),
        }
    }

    pub async fn pdf_toolkit(&self) -> Result<Arc<PdfToolkit>> {
        match self.acquire(ProviderKind::PdfManipulation).await? {
            ProviderHandle::Manipulation(toolkit) => Ok(toolkit),
            other => Err(mismatch(ProviderKind::PdfManipulation, &other)),
        }
    }

    pub async fn rasterizer(&self) -> Result<Arc<MarkupRasterizer>> {
        match self.acquire(ProviderKind::MarkupRasterizer).await? {
            ProviderHandle::Rasterizer(rasterizer) => Ok(rasterizer),
            other => Err(mismatch(ProviderKind::MarkupRasterizer, &other)),
        }
    }
}

fn mismatch(kind: ProviderKind, handle: &ProviderHandle) -> Error {
    Error::ProviderUnavailable {
        kind,
        reason: format!("cached slot holds a {} provider", handle.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts loads and fails the first `failures` of them
    struct FakeFactory {
        loads: AtomicUsize,
        failures: usize,
    }

    impl FakeFactory {
        fn new(failures: usize) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                failures,
            }
        }
    }

    impl ProviderFactory for FakeFactory {
        fn load(&self, kind: ProviderKind) -> BoxFuture<'_, Result<ProviderHandle>> {
            Box::pin(async move {
                let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
                if attempt < self.failures {
                    return Err(Error::General("bootstrap failed".to_string()));
                }
                match kind {
                    ProviderKind::PdfManipulation => {
                        Ok(ProviderHandle::Manipulation(Arc::new(PdfToolkit::default())))
                    }
                    other => Err(Error::ProviderUnavailable {
                        kind: other,
                        reason: "not available in tests".to_string(),
                    }),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_first_load_is_cached() {
        let loader = CapabilityLoader::new(FakeFactory::new(0));
        assert!(!loader.is_loaded(ProviderKind::PdfManipulation));

        let first = loader.pdf_toolkit().await.unwrap();
        let second = loader.pdf_toolkit().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.factory.loads.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded(ProviderKind::PdfManipulation));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let loader = CapabilityLoader::new(FakeFactory::new(1));

        let err = loader.acquire(ProviderKind::PdfManipulation).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!loader.is_loaded(ProviderKind::PdfManipulation));

        assert!(loader.acquire(ProviderKind::PdfManipulation).await.is_ok());
        assert_eq!(loader.factory.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_kinds_load_independently() {
        let loader = CapabilityLoader::new(FakeFactory::new(0));
        let (raster, toolkit) = tokio::join!(
            loader.acquire(ProviderKind::MarkupRasterizer),
            loader.acquire(ProviderKind::PdfManipulation),
        );
        assert!(matches!(
            raster,
            Err(Error::ProviderUnavailable {
                kind: ProviderKind::MarkupRasterizer,
                ..
            })
        ));
        assert!(toolkit.is_ok());
        assert!(!loader.is_loaded(ProviderKind::MarkupRasterizer));
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<String> = ProviderKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["vector-builder", "pdf-manipulation", "markup-rasterizer"]);
    }

    #[tokio::test]
    async fn test_default_factory_loads_toolkit() {
        let factory = DefaultProviderFactory::new(Arc::new(EngineConfig::default()));
        let loader = CapabilityLoader::new(factory);
        let toolkit = loader.pdf_toolkit().await.unwrap();
        let bold = toolkit.annotation_face(crate::fonts::FontStyle::Bold);
        assert_eq!(bold.base_font(), "Helvetica-Bold");
    }
}
