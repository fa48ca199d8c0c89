//! Content render pass bookkeeping
//!
//! At most one content pass is in flight. A pass is a snapshot of the slot
//! bindings that needed content when it started; its jobs may complete in any
//! order and the pass ends once every job has reported back.

use std::collections::HashSet;

use log::debug;

use super::window::SlotId;

/// Identifier of a content render pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PassId(pub u64);

/// One page decode requested by a pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderJob {
    pub pass: PassId,
    pub slot: SlotId,
    pub page: usize,
    /// Slot generation captured when the pass started
    pub generation: u64,
    /// Document units to surface pixels
    pub scale: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub id: PassId,
    pub jobs: Vec<RenderJob>,
}

/// What the scheduler did with a job completion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobProgress {
    /// Jobs of this pass are still outstanding
    Pending,
    /// The last job of the pass reported back
    PassComplete,
    /// The job does not belong to the in-flight pass
    Unknown,
}

#[derive(Debug)]
struct InFlight {
    id: PassId,
    outstanding: HashSet<SlotId>,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    in_flight: Option<InFlight>,
    next_pass: u64,
    dropped: u64,
}

impl RenderScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Pass requests dropped because another pass was in flight
    #[must_use]
    pub fn dropped_requests(&self) -> u64 {
        self.dropped
    }

    /// Start a pass over `bindings` (`slot, page, generation`).
    ///
    /// Returns `None` without queueing when a pass is already in flight, or
    /// when there is nothing to render.
    pub fn begin(&mut self, bindings: &[(SlotId, usize, u64)], scale: f32) -> Option<RenderPass> {
        if let Some(current) = &self.in_flight {
            self.dropped += 1;
            debug!("Render pass {:?} in flight, dropping request", current.id);
            return None;
        }
        if bindings.is_empty() {
            return None;
        }

        self.next_pass += 1;
        let id = PassId(self.next_pass);
        let jobs: Vec<RenderJob> = bindings
            .iter()
            .map(|&(slot, page, generation)| RenderJob {
                pass: id,
                slot,
                page,
                generation,
                scale,
            })
            .collect();

        self.in_flight = Some(InFlight {
            id,
            outstanding: jobs.iter().map(|j| j.slot).collect(),
        });
        debug!("Render pass {id:?} started with {} jobs", jobs.len());
        Some(RenderPass { id, jobs })
    }

    /// Record that `job` finished, successfully or not
    pub fn finish(&mut self, job: &RenderJob) -> JobProgress {
        let Some(current) = &mut self.in_flight else {
            return JobProgress::Unknown;
        };
        if current.id != job.pass || !current.outstanding.remove(&job.slot) {
            return JobProgress::Unknown;
        }
        if current.outstanding.is_empty() {
            debug!("Render pass {:?} complete", current.id);
            self.in_flight = None;
            JobProgress::PassComplete
        } else {
            JobProgress::Pending
        }
    }

    /// Forget the in-flight pass, e.g. when the document is replaced
    pub fn reset(&mut self) {
        self.in_flight = None;
    }
}
