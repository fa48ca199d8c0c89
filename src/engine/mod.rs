//! Viewport virtualization and stamp overlay engine

pub mod autoscroll;
pub mod config;
pub mod error;
pub mod geometry;
pub mod overlay;
pub mod pointer;
pub mod scheduler;
pub mod state;
pub mod surface;
pub mod transform;
pub mod viewport;
pub mod window;

pub use config::EngineConfig;
pub use error::EngineError;
pub use geometry::{ClientPoint, DocPoint, DocRect, PageGeometry};
pub use overlay::{Stamp, StampId, StampImage};
pub use pointer::{ControlVisibility, Interaction, PointerKind, PointerMode, Selection};
pub use scheduler::{PassId, RenderJob, RenderPass};
pub use state::{DocumentInfo, Effect, Engine, Event, JobOutcome};
pub use viewport::Viewport;
pub use window::{SlotId, SurfaceSlot};
