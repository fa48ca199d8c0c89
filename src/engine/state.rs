//! Engine context: events in, effects out
//!
//! All viewport, window, overlay and selection state lives in [`Engine`]. UI
//! input is fed through [`Engine::dispatch`] as [`Event`]s; the returned
//! [`Effect`]s tell the driver what to do next (start a content pass, schedule
//! an animation frame, update controls). Overlay repaints are executed inside
//! the engine before `dispatch` returns and are listed in the effects so
//! callers can present the touched surfaces.

use std::sync::Arc;

use image::RgbaImage;
use log::{debug, error, info};

use super::autoscroll::AutoScroll;
use super::config::EngineConfig;
use super::error::EngineError;
use super::geometry::{ClientPoint, DevicePoint, DocPoint, PageGeometry};
use super::overlay::{OverlayModel, Stamp, StampId, StampImage};
use super::pointer::{ControlVisibility, PointerKind, PointerMode, Selection};
use super::scheduler::{JobProgress, PassId, RenderJob, RenderPass, RenderScheduler};
use super::transform::{RowLayout, Transform};
use super::viewport::Viewport;
use super::window::{PageWindow, WindowChange, WindowGeometry};

/// Page count and reference geometry of the open document
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub reference: PageGeometry,
}

/// Input to the engine
#[derive(Clone, Debug)]
pub enum Event {
    DocumentLoaded {
        page_count: usize,
        reference: PageGeometry,
    },
    DocumentClosed,
    Resized {
        width: f32,
        height: f32,
        pixel_density: f32,
    },
    ScrollChanged {
        top: f32,
        left: f32,
    },
    ZoomChanged {
        percent: f32,
    },
    ZoomIn,
    ZoomOut,
    PointerDown(ClientPoint),
    PointerMove(ClientPoint),
    PointerUp(ClientPoint),
    /// Display refresh tick, drives auto-scroll
    AnimationFrame,
    SetPointerMode(PointerMode),
    /// Press on the control that opens the document for stamping
    EntryPointPressed(PointerKind),
    PlaceStamp(Arc<StampImage>),
    /// Place a stamp at a known spot, as when restoring or scripting
    PlaceStampAt {
        image: Arc<StampImage>,
        page: usize,
        position: DocPoint,
        scale: f32,
    },
    DuplicateSelected,
    DeleteStamp(StampId),
    DeleteSelected,
    ResizeSelected {
        factor: f32,
    },
    Deselect,
}

/// Output of the engine
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Dirty slots are waiting for page content; start a pass when idle
    RequestContentPass,
    /// The overlay surface of this page was repainted
    RepaintOverlay(usize),
    ControlsChanged(ControlVisibility),
    /// Geometry is known; emitted once per loaded document
    DocumentReady,
    /// Call back with [`Event::AnimationFrame`] on the next display refresh
    RequestAnimationFrame,
    /// The engine moved the scroll position itself
    ScrollTo { top: f32, left: f32 },
    PassComplete(PassId),
    StaleResultDiscarded { page: usize },
    RenderFailed { page: usize, reason: String },
}

/// Result of a page decode delivered back to the engine
#[derive(Debug)]
pub enum JobOutcome<'a> {
    Rendered(&'a RgbaImage),
    Failed(String),
}

/// Effect list without duplicates, in first-emitted order
#[derive(Debug, Default)]
pub(super) struct Effects(Vec<Effect>);

impl Effects {
    pub(super) fn push(&mut self, effect: Effect) {
        if !self.0.contains(&effect) {
            self.0.push(effect);
        }
    }

    fn repaint_pages(&self) -> Vec<usize> {
        self.0
            .iter()
            .filter_map(|e| match e {
                Effect::RepaintOverlay(page) => Some(*page),
                _ => None,
            })
            .collect()
    }
}

/// The viewport and overlay engine
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) viewport: Viewport,
    pub(super) document: Option<DocumentInfo>,
    pub(super) window: PageWindow,
    pub(super) scheduler: RenderScheduler,
    pub(super) overlay: OverlayModel,
    pub(super) selection: Option<Selection>,
    pub(super) mode: PointerMode,
    pub(super) autoscroll: AutoScroll,
    pub(super) controls: ControlVisibility,
    /// Logical clock for `last_interacted_at`
    clock: u64,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, viewport: Viewport) -> Self {
        let mut viewport = viewport;
        viewport.zoom_percent = config.clamp_zoom(config.initial_zoom);
        let mode = PointerMode::Pan;
        Self {
            config,
            viewport,
            document: None,
            window: PageWindow::new(),
            scheduler: RenderScheduler::new(),
            overlay: OverlayModel::new(),
            selection: None,
            mode,
            autoscroll: AutoScroll::default(),
            controls: ControlVisibility::compute(mode, false, false),
            clock: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    #[must_use]
    pub fn window(&self) -> &PageWindow {
        &self.window
    }

    #[must_use]
    pub fn overlay(&self) -> &OverlayModel {
        &self.overlay
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn mode(&self) -> PointerMode {
        self.mode
    }

    #[must_use]
    pub fn controls(&self) -> ControlVisibility {
        self.controls
    }

    #[must_use]
    pub fn is_pass_in_flight(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    /// Current transform, recomputed from viewport and reference geometry
    #[must_use]
    pub fn transform(&self) -> Option<Transform> {
        self.document
            .map(|doc| Transform::new(&self.viewport, &doc.reference, self.config.padding))
    }

    #[must_use]
    pub fn layout(&self) -> Option<RowLayout> {
        let doc = self.document?;
        let transform = self.transform()?;
        Some(RowLayout::new(
            &transform,
            &doc.reference,
            self.config.padding,
            self.config.row_gap,
        ))
    }

    /// First page whose row intersects the top of the viewport
    #[must_use]
    pub fn first_visible_page(&self) -> Option<usize> {
        let doc = self.document?;
        let layout = self.layout()?;
        Some(
            layout
                .first_visible(self.viewport.scroll_top)
                .min(doc.page_count.saturating_sub(1)),
        )
    }

    /// Apply one event and return the resulting effects
    pub fn dispatch(&mut self, event: Event) -> Result<Vec<Effect>, EngineError> {
        let mut fx = Effects::default();
        match event {
            Event::DocumentLoaded {
                page_count,
                reference,
            } => self.load_document(page_count, reference, &mut fx)?,
            Event::DocumentClosed => self.close_document(&mut fx),
            Event::Resized {
                width,
                height,
                pixel_density,
            } => self.change_geometry(&mut fx, |viewport, _| {
                viewport.resize(width, height, pixel_density)
            })?,
            Event::ScrollChanged { top, left } => {
                self.require_document()?;
                self.apply_scroll(top, left, &mut fx)?;
                let (clamped_top, clamped_left) =
                    (self.viewport.scroll_top, self.viewport.scroll_left);
                if clamped_top != top || clamped_left != left {
                    fx.push(Effect::ScrollTo {
                        top: clamped_top,
                        left: clamped_left,
                    });
                }
            }
            Event::ZoomChanged { percent } => {
                self.require_document()?;
                self.change_geometry(&mut fx, |viewport, config| {
                    viewport.set_zoom(percent, config)
                })?;
            }
            Event::ZoomIn => {
                self.require_document()?;
                self.change_geometry(&mut fx, Viewport::step_in)?;
            }
            Event::ZoomOut => {
                self.require_document()?;
                self.change_geometry(&mut fx, Viewport::step_out)?;
            }
            Event::PointerDown(position) => self.pointer_down(position, &mut fx)?,
            Event::PointerMove(position) => self.pointer_move(position, &mut fx)?,
            Event::PointerUp(_) => self.pointer_up(&mut fx)?,
            Event::AnimationFrame => self.animation_frame(&mut fx)?,
            Event::SetPointerMode(mode) => self.set_mode(mode, &mut fx),
            Event::EntryPointPressed(kind) => self.set_mode(PointerMode::for_entry(kind), &mut fx),
            Event::PlaceStamp(image) => {
                self.require_document()?;
                let page = self.first_visible_page().ok_or(EngineError::NoDocument)?;
                let position = self.config.default_stamp_position;
                self.place_stamp(image, page, position, 1.0, &mut fx)?;
            }
            Event::PlaceStampAt {
                image,
                page,
                position,
                scale,
            } => self.place_stamp(image, page, position, scale, &mut fx)?,
            Event::DuplicateSelected => self.duplicate_selected(&mut fx)?,
            Event::DeleteStamp(id) => self.delete_stamp(id, &mut fx)?,
            Event::DeleteSelected => {
                let id = self.selection.ok_or(EngineError::NoSelection)?.stamp;
                self.delete_stamp(id, &mut fx)?;
            }
            Event::ResizeSelected { factor } => self.resize_selected(factor, &mut fx)?,
            Event::Deselect => self.set_selection(None, &mut fx),
        }
        self.paint_overlays(&fx)?;
        Ok(fx.0)
    }

    /// Start a content pass over dirty slots.
    ///
    /// Returns `None` when a pass is already in flight (the request is
    /// dropped) or when no bound slot needs content.
    pub fn begin_content_pass(&mut self) -> Option<RenderPass> {
        let doc = self.document?;
        let scale = self.transform()?.raster_scale(&doc.reference);
        let bindings = self.window.dirty_bindings();
        self.scheduler.begin(&bindings, scale)
    }

    /// Deliver the result of one job of the in-flight pass.
    ///
    /// Results whose slot was rebound since the pass started are discarded.
    pub fn complete_job(
        &mut self,
        job: &RenderJob,
        outcome: JobOutcome<'_>,
    ) -> Result<Vec<Effect>, EngineError> {
        let mut fx = Effects::default();
        let progress = self.scheduler.finish(job);

        let fresh = self.window.slot_mut(job.slot).and_then(|slot| {
            (slot.page() == Some(job.page) && slot.generation() == job.generation).then_some(slot)
        });

        match (fresh, outcome) {
            (Some(slot), JobOutcome::Rendered(raster)) => {
                slot.content.paint_page(raster)?;
                slot.mark_content_clean();
                fx.push(Effect::RepaintOverlay(job.page));
            }
            (Some(slot), JobOutcome::Failed(reason)) => {
                error!("Rendering page {} failed: {reason}", job.page);
                slot.mark_content_clean();
                fx.push(Effect::RenderFailed {
                    page: job.page,
                    reason,
                });
            }
            (None, _) => {
                debug!(
                    "Discarding stale render of page {} for slot {:?}",
                    job.page, job.slot
                );
                fx.push(Effect::StaleResultDiscarded { page: job.page });
            }
        }

        if progress == JobProgress::PassComplete {
            fx.push(Effect::PassComplete(job.pass));
            if self.window.has_dirty_content() {
                fx.push(Effect::RequestContentPass);
            }
        }
        self.paint_overlays(&fx)?;
        Ok(fx.0)
    }

    pub(super) fn require_document(&self) -> Result<DocumentInfo, EngineError> {
        self.document.ok_or(EngineError::NoDocument)
    }

    pub(super) fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn load_document(
        &mut self,
        page_count: usize,
        reference: PageGeometry,
        fx: &mut Effects,
    ) -> Result<(), EngineError> {
        if page_count == 0 {
            return Err(EngineError::EmptyDocument);
        }
        if !reference.is_valid() {
            return Err(EngineError::InvalidGeometry {
                width: reference.width,
                height: reference.height,
            });
        }

        info!(
            "Document loaded: {page_count} pages, reference {}x{}",
            reference.width, reference.height
        );
        self.scheduler.reset();
        self.overlay.clear();
        self.autoscroll.stop();
        self.selection = None;
        self.window.clear();
        self.viewport.zoom_percent = self.config.clamp_zoom(self.config.initial_zoom);
        self.viewport.scroll_top = 0.0;
        self.viewport.scroll_left = 0.0;
        self.document = Some(DocumentInfo {
            page_count,
            reference,
        });

        if let Err(e) = self.rebuild_window(fx) {
            self.document = None;
            self.window.clear();
            return Err(e);
        }
        fx.push(Effect::DocumentReady);
        self.notify_controls(fx);
        Ok(())
    }

    fn close_document(&mut self, fx: &mut Effects) {
        if self.document.take().is_some() {
            info!("Document closed");
        }
        self.scheduler.reset();
        self.overlay.clear();
        self.autoscroll.stop();
        self.selection = None;
        self.window.clear();
        self.notify_controls(fx);
    }

    fn window_geometry(&self) -> Result<WindowGeometry, EngineError> {
        let doc = self.require_document()?;
        let transform = Transform::new(&self.viewport, &doc.reference, self.config.padding);
        Ok(WindowGeometry {
            layout: RowLayout::new(
                &transform,
                &doc.reference,
                self.config.padding,
                self.config.row_gap,
            ),
            scroll_top: self.viewport.scroll_top,
            viewport_height: self.viewport.height,
            page_count: doc.page_count,
            surface_size: transform.surface_size(&doc.reference),
        })
    }

    /// Clamp scroll offsets to the content bounds of the current layout
    fn clamp_scroll(&mut self, top: f32, left: f32) -> Result<bool, EngineError> {
        let doc = self.require_document()?;
        let geometry = self.window_geometry()?;
        let max_top = geometry.layout.content_height(doc.page_count) - self.viewport.height;
        let max_left = geometry.layout.content_width() - self.viewport.width;
        Ok(self.viewport.scroll_to(top, left, max_top, max_left))
    }

    /// Apply a viewport change and rebuild the window for it.
    ///
    /// If the rebuild fails the previous viewport is restored and the window
    /// rebuilt for it again before the error is returned.
    fn change_geometry(
        &mut self,
        fx: &mut Effects,
        change: impl FnOnce(&mut Viewport, &EngineConfig) -> bool,
    ) -> Result<(), EngineError> {
        let previous = self.viewport.clone();
        if !change(&mut self.viewport, &self.config) || self.document.is_none() {
            return Ok(());
        }
        let Err(e) = self.rebuild_window(fx) else {
            return Ok(());
        };
        self.viewport = previous;
        if let Err(restore) = self.rebuild_window(&mut Effects::default()) {
            error!("Restoring the page window failed: {restore}");
            self.window.clear();
        }
        Err(e)
    }

    /// Full rebuild after a geometry change
    pub(super) fn rebuild_window(&mut self, fx: &mut Effects) -> Result<(), EngineError> {
        let (top, left) = (self.viewport.scroll_top, self.viewport.scroll_left);
        if self.clamp_scroll(top, left)? {
            fx.push(Effect::ScrollTo {
                top: self.viewport.scroll_top,
                left: self.viewport.scroll_left,
            });
        }
        let geometry = self.window_geometry()?;
        let change = self.window.rebuild(&geometry)?;
        self.after_window_change(change, fx);
        Ok(())
    }

    /// Pure scroll: clamp, then rotate or rebuild the window as needed
    pub(super) fn apply_scroll(
        &mut self,
        top: f32,
        left: f32,
        fx: &mut Effects,
    ) -> Result<bool, EngineError> {
        let moved = self.clamp_scroll(top, left)?;
        let geometry = self.window_geometry()?;
        let change = self.window.scroll(&geometry)?;
        self.after_window_change(change, fx);
        Ok(moved)
    }

    fn after_window_change(&mut self, change: WindowChange, fx: &mut Effects) {
        match change {
            WindowChange::Unchanged => {}
            WindowChange::Rebuilt => {
                for page in self.window.bound_pages() {
                    fx.push(Effect::RepaintOverlay(page));
                }
                if self.window.has_dirty_content() {
                    fx.push(Effect::RequestContentPass);
                }
            }
            WindowChange::Rotated { rebound, .. } => {
                for &page in &rebound {
                    fx.push(Effect::RepaintOverlay(page));
                }
                if !rebound.is_empty() {
                    fx.push(Effect::RequestContentPass);
                }
            }
        }
    }

    /// Execute the overlay repaints collected in `fx`
    fn paint_overlays(&mut self, fx: &Effects) -> Result<(), EngineError> {
        let Some(doc) = self.document else {
            return Ok(());
        };
        let Some(transform) = self.transform() else {
            return Ok(());
        };
        let scale = transform.raster_scale(&doc.reference);
        let selected = self.selection.map(|s| s.stamp);
        let stamp_width = self.config.stamp_width;

        for page in fx.repaint_pages() {
            if let Some(slot) = self.window.slot_for_page_mut(page) {
                self.overlay
                    .paint_page(page, &mut slot.overlay, scale, stamp_width, selected)?;
            }
        }
        Ok(())
    }

    /// Resolve a client point to a bound page and document coordinates on it
    pub(super) fn locate(&self, client: ClientPoint) -> Option<(usize, DocPoint)> {
        let doc = self.document?;
        let layout = self.layout()?;
        let transform = self.transform()?;
        let (page, css_x, css_y) = layout.locate(client, &self.viewport, doc.page_count)?;
        self.window.slot_for_page(page)?;
        let density = self.viewport.pixel_density;
        let point = transform.to_document(DevicePoint::new(css_x * density, css_y * density));
        Some((page, point))
    }

    /// Change the selection, repainting affected pages and updating controls
    pub(super) fn set_selection(&mut self, selection: Option<Selection>, fx: &mut Effects) {
        let previous = self.selection.map(|s| s.stamp);
        let next = selection.map(|s| s.stamp);
        self.selection = selection;
        if previous != next {
            for id in [previous, next].into_iter().flatten() {
                if let Some(stamp) = self.overlay.get(id) {
                    fx.push(Effect::RepaintOverlay(stamp.page));
                }
            }
        }
        self.notify_controls(fx);
    }

    pub(super) fn set_mode(&mut self, mode: PointerMode, fx: &mut Effects) {
        if self.mode != mode {
            debug!("Pointer mode {:?} -> {mode:?}", self.mode);
        }
        self.mode = mode;
        if mode == PointerMode::Pan {
            self.autoscroll.stop();
            self.set_selection(None, fx);
        }
        self.notify_controls(fx);
    }

    pub(super) fn notify_controls(&mut self, fx: &mut Effects) {
        let controls = ControlVisibility::compute(
            self.mode,
            self.selection.is_some(),
            self.document.is_some(),
        );
        if controls != self.controls {
            self.controls = controls;
            fx.push(Effect::ControlsChanged(controls));
        }
    }

    fn place_stamp(
        &mut self,
        image: Arc<StampImage>,
        page: usize,
        position: DocPoint,
        scale: f32,
        fx: &mut Effects,
    ) -> Result<(), EngineError> {
        let doc = self.require_document()?;
        if page >= doc.page_count {
            return Err(EngineError::PageOutOfRange {
                page,
                page_count: doc.page_count,
            });
        }
        let now = self.tick();
        let id = self.overlay.next_stamp_id();
        self.overlay.insert_front(Stamp {
            id,
            image,
            position,
            scale: self.config.clamp_scale(scale),
            page,
            last_interacted_at: now,
        });
        debug!("Placed stamp {id} on page {page} at ({}, {})", position.x, position.y);

        self.set_mode(PointerMode::Select, fx);
        self.set_selection(Some(Selection::new(id)), fx);
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }

    fn duplicate_selected(&mut self, fx: &mut Effects) -> Result<(), EngineError> {
        let selected = self.selection.ok_or(EngineError::NoSelection)?.stamp;
        let source = self
            .overlay
            .get(selected)
            .cloned()
            .ok_or(EngineError::UnknownStamp(selected))?;
        let now = self.tick();
        let id = self.overlay.next_stamp_id();
        let offset = self.config.duplicate_offset;
        let page = source.page;
        self.overlay.insert_front(Stamp {
            id,
            position: source.position.offset(offset, offset),
            last_interacted_at: now,
            ..source
        });
        debug!("Duplicated stamp {selected} as {id}");

        self.set_selection(Some(Selection::new(id)), fx);
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }

    fn delete_stamp(&mut self, id: StampId, fx: &mut Effects) -> Result<(), EngineError> {
        let page = self.overlay.get(id).ok_or(EngineError::UnknownStamp(id))?.page;
        self.set_selection(None, fx);
        self.overlay.remove(id)?;
        debug!("Deleted stamp {id}");
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }

    fn resize_selected(&mut self, factor: f32, fx: &mut Effects) -> Result<(), EngineError> {
        let selected = self.selection.ok_or(EngineError::NoSelection)?.stamp;
        let scale = {
            let stamp = self
                .overlay
                .get(selected)
                .ok_or(EngineError::UnknownStamp(selected))?;
            self.config.clamp_scale(stamp.scale * factor)
        };
        let stamp = self
            .overlay
            .get_mut(selected)
            .ok_or(EngineError::UnknownStamp(selected))?;
        stamp.scale = scale;
        let page = stamp.page;
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }
}
