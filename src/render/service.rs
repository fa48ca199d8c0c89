//! Render service - manages worker pool and cache, feeds results to the engine

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use super::cache::{CacheKey, PageCache};
use super::request::{RenderRequest, RenderResponse};
use super::worker::render_worker;
use super::{DEFAULT_CACHE_SIZE, DEFAULT_WORKERS};
use crate::engine::{Effect, Engine, EngineError, JobOutcome, RenderJob, SlotId};
use crate::source::SourceOpener;

/// Decodes pages for engine content passes on worker threads
pub struct RenderService {
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
    num_workers: usize,
    /// Jobs sent to workers and not yet answered
    pending: HashSet<(SlotId, u64)>,
}

impl RenderService {
    /// Create a new render service with default configuration
    #[must_use]
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self::with_config(opener, DEFAULT_WORKERS, DEFAULT_CACHE_SIZE)
    }

    /// Create a new render service with custom configuration
    #[must_use]
    pub fn with_config(opener: Arc<dyn SourceOpener>, num_workers: usize, cache_size: usize) -> Self {
        let cache = Arc::new(Mutex::new(PageCache::new(cache_size)));

        // flume gives MPMC channels: every worker clones the request receiver
        // and pulls from the shared queue.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        for _ in 0..num_workers.max(1) {
            let opener = opener.clone();
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let cache_clone = cache.clone();

            std::thread::spawn(move || {
                render_worker(opener, rx, tx, cache_clone);
            });
        }

        Self {
            request_tx,
            response_rx,
            cache,
            num_workers: num_workers.max(1),
            pending: HashSet::new(),
        }
    }

    /// Start a content pass if the engine has dirty slots and none is in flight.
    ///
    /// Cached pages are delivered immediately; the rest go to the workers.
    pub fn start_pass(&mut self, engine: &mut Engine) -> Result<Vec<Effect>, EngineError> {
        let Some(pass) = engine.begin_content_pass() else {
            return Ok(Vec::new());
        };

        let mut effects = Vec::new();
        for job in pass.jobs {
            let key = CacheKey::new(job.page, job.scale);
            let cached = self
                .cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&key);
            match cached {
                Some(image) => {
                    effects.extend(engine.complete_job(&job, JobOutcome::Rendered(&image))?);
                }
                None => self.send(job),
            }
        }
        Ok(effects)
    }

    fn send(&mut self, job: RenderJob) {
        if self.request_tx.send(RenderRequest::Page(job)).is_ok() {
            self.pending.insert((job.slot, job.pass.0));
        } else {
            error!("Render workers gone, page {} not requested", job.page);
        }
    }

    /// Deliver every response that has arrived so far
    pub fn poll(&mut self, engine: &mut Engine) -> Result<Vec<Effect>, EngineError> {
        let mut effects = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            effects.extend(self.deliver(engine, &response)?);
        }
        Ok(effects)
    }

    /// Block until the in-flight pass completes or `timeout` elapses
    pub fn wait(&mut self, engine: &mut Engine, timeout: Duration) -> Result<Vec<Effect>, EngineError> {
        let deadline = Instant::now() + timeout;
        let mut effects = Vec::new();
        while engine.is_pass_in_flight() && !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => effects.extend(self.deliver(engine, &response)?),
                Err(RecvTimeoutError::Timeout) => {
                    debug!("Render wait timed out with {} jobs pending", self.pending.len());
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Render workers disconnected");
                    break;
                }
            }
        }
        Ok(effects)
    }

    fn deliver(
        &mut self,
        engine: &mut Engine,
        response: &RenderResponse,
    ) -> Result<Vec<Effect>, EngineError> {
        let job = response.job();
        self.pending.remove(&(job.slot, job.pass.0));
        match response {
            RenderResponse::Page { job, image } => {
                engine.complete_job(job, JobOutcome::Rendered(image))
            }
            RenderResponse::Error { job, error } => {
                engine.complete_job(job, JobOutcome::Failed(error.to_string()))
            }
        }
    }

    /// Jobs sent to workers and not yet delivered
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Shutdown all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
