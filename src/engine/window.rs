//! Page window: a bounded pool of surface slots bound to the loaded page range
//!
//! The pool holds `3 * look_ahead` slots (one screen behind, the visible screen,
//! one screen ahead). Scrolling rotates slots between both ends of the window
//! instead of allocating, so a slot keeps its [`SlotId`] and surfaces for as
//! long as the document is open.

use std::ops::Range;

use log::debug;

use super::error::EngineError;
use super::surface::Surface;
use super::transform::RowLayout;

/// Stable identity of a surface slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

/// A reusable content/overlay surface pair and its page binding
#[derive(Debug)]
pub struct SurfaceSlot {
    id: SlotId,
    pub content: Surface,
    pub overlay: Surface,
    page: Option<usize>,
    /// Screen offset of the bound page within the scroll content
    top: f32,
    /// Bumped on every (re)binding; render results carry the value they were requested for
    generation: u64,
    content_dirty: bool,
}

impl SurfaceSlot {
    fn new(id: SlotId) -> Self {
        Self {
            id,
            content: Surface::default(),
            overlay: Surface::default(),
            page: None,
            top: 0.0,
            generation: 0,
            content_dirty: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[must_use]
    pub fn page(&self) -> Option<usize> {
        self.page
    }

    #[must_use]
    pub fn top(&self) -> f32 {
        self.top
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_content_dirty(&self) -> bool {
        self.content_dirty
    }

    pub(crate) fn mark_content_clean(&mut self) {
        self.content_dirty = false;
    }

    fn unbind(&mut self) {
        self.page = None;
        self.content_dirty = false;
    }
}

/// What a window update did to the slot bindings
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowChange {
    Unchanged,
    /// Every slot was released and rebound
    Rebuilt,
    /// Slots were rotated by `distance`; only `rebound` changed page
    Rotated { distance: isize, rebound: Vec<usize> },
}

/// Inputs shared by rebuild and scroll reconciliation
#[derive(Clone, Copy, Debug)]
pub struct WindowGeometry {
    pub layout: RowLayout,
    pub scroll_top: f32,
    pub viewport_height: f32,
    pub page_count: usize,
    /// Pixel size of each page surface
    pub surface_size: (u32, u32),
}

/// Pool of surface slots bound to a contiguous range of pages
#[derive(Debug, Default)]
pub struct PageWindow {
    slots: Vec<SurfaceSlot>,
    /// Number of slots in use; slots past this index are parked
    active: usize,
    look_ahead: usize,
    /// First page of the window before clamping to the document
    start: isize,
    next_generation: u64,
}

impl PageWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.active
    }

    /// Slots in window order, including unbound ones at the document edges
    pub fn slots(&self) -> impl Iterator<Item = &SurfaceSlot> {
        self.slots[..self.active].iter()
    }

    /// Every slot ever created, including parked ones
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slot_for_page(&self, page: usize) -> Option<&SurfaceSlot> {
        self.slots().find(|s| s.page == Some(page))
    }

    pub fn slot_for_page_mut(&mut self, page: usize) -> Option<&mut SurfaceSlot> {
        self.slots[..self.active]
            .iter_mut()
            .find(|s| s.page == Some(page))
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut SurfaceSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Pages currently bound, in window order
    #[must_use]
    pub fn bound_pages(&self) -> Vec<usize> {
        self.slots().filter_map(SurfaceSlot::page).collect()
    }

    /// The loaded page range, clamped to the document
    #[must_use]
    pub fn loaded_range(&self, page_count: usize) -> Range<usize> {
        clamp_range(self.start, self.active, page_count)
    }

    #[must_use]
    pub fn has_dirty_content(&self) -> bool {
        self.slots().any(|s| s.page.is_some() && s.content_dirty)
    }

    /// `(slot, page, generation)` for every bound slot awaiting content
    #[must_use]
    pub fn dirty_bindings(&self) -> Vec<(SlotId, usize, u64)> {
        self.slots()
            .filter(|s| s.content_dirty)
            .filter_map(|s| s.page.map(|page| (s.id, page, s.generation)))
            .collect()
    }

    /// Release all bindings and rebind every slot for the current geometry
    pub fn rebuild(&mut self, geometry: &WindowGeometry) -> Result<WindowChange, EngineError> {
        if geometry.page_count == 0 {
            self.clear();
            return Ok(WindowChange::Rebuilt);
        }

        let look_ahead = geometry.layout.look_ahead(geometry.viewport_height);
        let pool_size = look_ahead * 3;
        let first_visible = geometry.layout.first_visible(geometry.scroll_top);

        while self.slots.len() < pool_size {
            let id = SlotId(self.slots.len());
            self.slots.push(SurfaceSlot::new(id));
        }
        for slot in &mut self.slots[pool_size..] {
            slot.unbind();
            slot.content.release();
            slot.overlay.release();
        }

        self.active = pool_size;
        self.look_ahead = look_ahead;
        self.start = first_visible as isize - look_ahead as isize;

        for i in 0..self.active {
            self.slots[i].unbind();
        }
        for i in 0..self.active {
            self.bind_position(i, geometry)?;
        }

        debug!(
            "Window rebuilt: pool {} slots, pages {:?}, first visible {}",
            pool_size,
            self.loaded_range(geometry.page_count),
            first_visible
        );
        Ok(WindowChange::Rebuilt)
    }

    /// Reconcile the window after a pure scroll
    pub fn scroll(&mut self, geometry: &WindowGeometry) -> Result<WindowChange, EngineError> {
        if self.active == 0 {
            return Ok(WindowChange::Unchanged);
        }

        let first_visible = geometry.layout.first_visible(geometry.scroll_top);
        let new_start = first_visible as isize - self.look_ahead as isize;
        let distance = new_start - self.start;
        if distance == 0 {
            return Ok(WindowChange::Unchanged);
        }
        if distance.unsigned_abs() >= self.active {
            debug!("Scroll distance {distance} exceeds pool, rebuilding");
            return self.rebuild(geometry);
        }

        if distance > 0 {
            self.slots[..self.active].rotate_left(distance.unsigned_abs());
        } else {
            self.slots[..self.active].rotate_right(distance.unsigned_abs());
        }
        self.start = new_start;

        let mut rebound = Vec::new();
        for i in 0..self.active {
            let expected = self.page_at(i, geometry.page_count);
            if self.slots[i].page != expected {
                self.bind_position(i, geometry)?;
                rebound.extend(expected);
            }
        }

        debug!(
            "Window rotated by {distance}: pages {:?}, rebound {rebound:?}",
            self.loaded_range(geometry.page_count)
        );
        Ok(WindowChange::Rotated { distance, rebound })
    }

    /// Drop every binding and surface, e.g. when the document closes
    pub fn clear(&mut self) {
        self.slots.clear();
        self.active = 0;
        self.look_ahead = 0;
        self.start = 0;
    }

    fn page_at(&self, position: usize, page_count: usize) -> Option<usize> {
        let page = self.start + position as isize;
        (page >= 0 && (page as usize) < page_count).then_some(page as usize)
    }

    fn bind_position(&mut self, position: usize, geometry: &WindowGeometry) -> Result<(), EngineError> {
        let page = self.page_at(position, geometry.page_count);
        self.next_generation += 1;
        let generation = self.next_generation;
        let slot = &mut self.slots[position];
        slot.generation = generation;
        match page {
            Some(page) => {
                let (width, height) = geometry.surface_size;
                slot.content.prepare(width, height)?;
                slot.overlay.prepare(width, height)?;
                slot.page = Some(page);
                slot.top = geometry.layout.page_top(page);
                slot.content_dirty = true;
            }
            None => slot.unbind(),
        }
        Ok(())
    }
}

fn clamp_range(start: isize, len: usize, page_count: usize) -> Range<usize> {
    let end = (start + len as isize).clamp(0, page_count as isize) as usize;
    let start = start.clamp(0, page_count as isize) as usize;
    start..end
}
