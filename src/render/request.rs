//! Render request and response types

use std::sync::Arc;

use image::RgbaImage;

use crate::engine::RenderJob;
use crate::source::SourceError;

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Decode the page of a pass job
    Page(RenderJob),

    /// Shutdown the worker
    Shutdown,
}

/// Errors from render workers
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("document source: {0}")]
    Source(#[from] SourceError),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RenderFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Decoded page for a job
    Page { job: RenderJob, image: Arc<RgbaImage> },

    /// Error while decoding a job
    Error { job: RenderJob, error: RenderFault },
}

impl RenderResponse {
    #[must_use]
    pub fn job(&self) -> &RenderJob {
        match self {
            Self::Page { job, .. } | Self::Error { job, .. } => job,
        }
    }
}
