//! Document sources: page count, geometry and page rasters

#[cfg(feature = "pdf")]
pub mod pdf;

use image::RgbaImage;

use crate::engine::PageGeometry;

/// Errors from opening or rendering a document
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot open {path}: {detail}")]
    Open { path: String, detail: String },

    #[error("document has no pages")]
    Empty,

    #[error("page {page} outside [0, {page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Render { detail: String },
}

impl SourceError {
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render { detail: msg.into() }
    }
}

/// A decoded document.
///
/// Implementations need not be thread safe; the render service opens one per
/// worker through a [`SourceOpener`].
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    fn page_geometry(&self, page: usize) -> Result<PageGeometry, SourceError>;

    /// Rasterize `page` with document units scaled by `scale`
    fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage, SourceError>;
}

/// Opens independent handles to the same document
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn DocumentSource>, SourceError>;
}

/// Geometry of the first page, used as the reference for every page
pub fn reference_geometry(source: &dyn DocumentSource) -> Result<PageGeometry, SourceError> {
    if source.page_count() == 0 {
        return Err(SourceError::Empty);
    }
    source.page_geometry(0)
}

pub(crate) fn check_page(page: usize, page_count: usize) -> Result<(), SourceError> {
    if page < page_count {
        Ok(())
    } else {
        Err(SourceError::PageOutOfRange { page, page_count })
    }
}
