//! Render worker - runs in separate thread(s)

use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};
use log::{debug, error};

use super::cache::{CacheKey, PageCache};
use super::request::{RenderFault, RenderRequest, RenderResponse};
use crate::engine::RenderJob;
use crate::source::{DocumentSource, SourceOpener};

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    opener: Arc<dyn SourceOpener>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
) {
    let source = match opener.open() {
        Ok(source) => source,
        Err(e) => {
            error!("Render worker cannot open document: {e}");
            // keep answering so no pass waits forever on this worker
            let detail = e.to_string();
            for request in requests {
                match request {
                    RenderRequest::Page(job) => {
                        let _ = responses.send(RenderResponse::Error {
                            job,
                            error: RenderFault::generic(detail.clone()),
                        });
                    }
                    RenderRequest::Shutdown => break,
                }
            }
            return;
        }
    };

    for request in requests {
        match request {
            RenderRequest::Page(job) => {
                handle_page_request(source.as_ref(), job, &cache, &responses);
            }
            RenderRequest::Shutdown => break,
        }
    }
}

fn handle_page_request(
    source: &dyn DocumentSource,
    job: RenderJob,
    cache: &Arc<Mutex<PageCache>>,
    responses: &Sender<RenderResponse>,
) {
    let key = CacheKey::new(job.page, job.scale);

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(cached) = cached {
        let _ = responses.send(RenderResponse::Page { job, image: cached });
        return;
    }

    debug!("Decoding page {} at scale {:.3}", job.page, job.scale);
    match source.render_page(job.page, job.scale) {
        Ok(image) => {
            let image = cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, image);
            let _ = responses.send(RenderResponse::Page { job, image });
        }
        Err(e) => {
            let _ = responses.send(RenderResponse::Error {
                job,
                error: RenderFault::Source(e),
            });
        }
    }
}
