//! Engine error types

use super::overlay::StampId;

/// Errors returned by engine operations.
///
/// Input and precondition errors leave the engine state untouched. A surface
/// failure during a resize or zoom restores the previous viewport and rebuilds
/// the window for it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no document loaded")]
    NoDocument,

    #[error("document has no pages")]
    EmptyDocument,

    #[error("invalid reference page geometry {width}x{height}")]
    InvalidGeometry { width: f32, height: f32 },

    #[error("page {page} outside [0, {page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("unknown stamp {0}")]
    UnknownStamp(StampId),

    #[error("no stamp selected")]
    NoSelection,

    #[error("drawing surface {width}x{height} unavailable")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("image resize: {0}")]
    Resize(String),
}
