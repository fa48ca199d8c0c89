//! Page content rendering for engine passes

mod cache;
mod request;
mod service;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use request::{RenderFault, RenderRequest, RenderResponse};
pub use service::RenderService;

use crate::engine::{Effect, Engine, EngineError, JobOutcome};
use crate::source::DocumentSource;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_CACHE_SIZE: usize = 24;

/// Run content passes on the calling thread until no slot needs content
pub fn render_blocking(
    engine: &mut Engine,
    source: &dyn DocumentSource,
) -> Result<Vec<Effect>, EngineError> {
    let mut effects = Vec::new();
    while let Some(pass) = engine.begin_content_pass() {
        for job in &pass.jobs {
            let outcome = source.render_page(job.page, job.scale);
            let delivered = match &outcome {
                Ok(image) => engine.complete_job(job, JobOutcome::Rendered(image))?,
                Err(e) => engine.complete_job(job, JobOutcome::Failed(e.to_string()))?,
            };
            effects.extend(delivered);
        }
    }
    Ok(effects)
}
