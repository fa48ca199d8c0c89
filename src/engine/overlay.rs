//! Overlay object model: placed stamps ordered by recency
//!
//! The collection is kept most-recent-first. Hit testing walks it front to
//! back and painting walks it back to front, so whatever was touched last is
//! both drawn on top and picked first.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use lru::LruCache;

use super::error::EngineError;
use super::geometry::{DocPoint, DocRect};
use super::surface::{SELECTION_COLOR, Surface, resize_rgba};

const SCALED_CACHE_SIZE: usize = 32;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a placed stamp
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StampId(pub u64);

impl fmt::Display for StampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a stamp image, shared by all duplicates of a stamp
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);

/// Stamp artwork: a raster plus the vector source it came from, if any
pub struct StampImage {
    id: ImageId,
    raster: RgbaImage,
    svg: Option<String>,
}

impl fmt::Debug for StampImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StampImage")
            .field("id", &self.id)
            .field("size", &self.raster.dimensions())
            .field("svg", &self.svg.is_some())
            .finish()
    }
}

impl StampImage {
    #[must_use]
    pub fn new(raster: RgbaImage, svg: Option<String>) -> Self {
        Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            raster,
            svg,
        }
    }

    #[must_use]
    pub fn id(&self) -> ImageId {
        self.id
    }

    #[must_use]
    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    #[must_use]
    pub fn svg(&self) -> Option<&str> {
        self.svg.as_deref()
    }

    /// Height over width of the raster
    #[must_use]
    pub fn aspect(&self) -> f32 {
        let (w, h) = self.raster.dimensions();
        if w == 0 { 1.0 } else { h as f32 / w as f32 }
    }
}

/// A stamp placed on a page
#[derive(Clone, Debug)]
pub struct Stamp {
    pub id: StampId,
    pub image: Arc<StampImage>,
    /// Top-left corner in document units of `page`
    pub position: DocPoint,
    pub scale: f32,
    pub page: usize,
    pub last_interacted_at: u64,
}

impl Stamp {
    /// Size in document units for a stamp of width `stamp_width` at scale 1
    #[must_use]
    pub fn size(&self, stamp_width: f32) -> (f32, f32) {
        let width = stamp_width * self.scale;
        (width, width * self.image.aspect())
    }

    #[must_use]
    pub fn bounds(&self, stamp_width: f32) -> DocRect {
        let (width, height) = self.size(stamp_width);
        DocRect::new(self.position.x, self.position.y, width, height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ScaledKey {
    image: ImageId,
    width: u32,
    height: u32,
}

/// Ordered stamp collection with an id -> position index
pub struct OverlayModel {
    /// Most recently interacted first
    stamps: Vec<Stamp>,
    index: HashMap<StampId, usize>,
    next_id: u64,
    scaled: LruCache<ScaledKey, Arc<RgbaImage>>,
}

impl Default for OverlayModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OverlayModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayModel")
            .field("stamps", &self.stamps)
            .finish_non_exhaustive()
    }
}

impl OverlayModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stamps: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
            scaled: LruCache::new(NonZeroUsize::new(SCALED_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    pub fn next_stamp_id(&mut self) -> StampId {
        let id = StampId(self.next_id);
        self.next_id += 1;
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Stamps, most recent first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Stamp> {
        self.stamps.iter()
    }

    #[must_use]
    pub fn get(&self, id: StampId) -> Option<&Stamp> {
        self.index.get(&id).map(|&i| &self.stamps[i])
    }

    pub fn get_mut(&mut self, id: StampId) -> Option<&mut Stamp> {
        let i = *self.index.get(&id)?;
        Some(&mut self.stamps[i])
    }

    pub fn insert_front(&mut self, stamp: Stamp) {
        self.stamps.insert(0, stamp);
        self.reindex();
    }

    pub fn remove(&mut self, id: StampId) -> Result<Stamp, EngineError> {
        let i = *self.index.get(&id).ok_or(EngineError::UnknownStamp(id))?;
        let stamp = self.stamps.remove(i);
        self.reindex();
        Ok(stamp)
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
        self.index.clear();
        self.scaled.clear();
    }

    /// Stable sort by `last_interacted_at`, most recent first
    pub fn sort_by_recency(&mut self) {
        self.stamps
            .sort_by(|a, b| b.last_interacted_at.cmp(&a.last_interacted_at));
        self.reindex();
    }

    /// Front-most stamp on `page` containing `point`
    #[must_use]
    pub fn hit_test(&self, page: usize, point: DocPoint, stamp_width: f32) -> Option<StampId> {
        self.stamps
            .iter()
            .filter(|s| s.page == page)
            .find(|s| s.bounds(stamp_width).contains(point))
            .map(|s| s.id)
    }

    /// Clear `surface` and draw the stamps of `page` back to front.
    ///
    /// `scale` maps document units to surface pixels.
    pub fn paint_page(
        &mut self,
        page: usize,
        surface: &mut Surface,
        scale: f32,
        stamp_width: f32,
        selected: Option<StampId>,
    ) -> Result<(), EngineError> {
        surface.clear();
        let on_page: Vec<Stamp> = self
            .stamps
            .iter()
            .rev()
            .filter(|s| s.page == page)
            .cloned()
            .collect();

        for stamp in &on_page {
            let bounds = stamp.bounds(stamp_width);
            let x = (bounds.x * scale).round() as i64;
            let y = (bounds.y * scale).round() as i64;
            let width = (bounds.width * scale).round().max(1.0) as u32;
            let height = (bounds.height * scale).round().max(1.0) as u32;

            let scaled = self.scaled_raster(&stamp.image, width, height)?;
            surface.composite(&scaled, x, y);
            if selected == Some(stamp.id) {
                surface.stroke_rect(x, y, width, height, SELECTION_COLOR);
            }
        }
        Ok(())
    }

    fn scaled_raster(
        &mut self,
        image: &StampImage,
        width: u32,
        height: u32,
    ) -> Result<Arc<RgbaImage>, EngineError> {
        let key = ScaledKey {
            image: image.id(),
            width,
            height,
        };
        if let Some(hit) = self.scaled.get(&key) {
            return Ok(hit.clone());
        }
        let scaled = Arc::new(resize_rgba(image.raster(), width, height)?);
        self.scaled.put(key, scaled.clone());
        Ok(scaled)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, stamp) in self.stamps.iter().enumerate() {
            self.index.insert(stamp.id, i);
        }
    }
}
