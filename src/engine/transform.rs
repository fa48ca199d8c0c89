//! Document <-> screen coordinate mapping
//!
//! Nothing here is cached: a [`Transform`] or [`RowLayout`] is built from the
//! current viewport and reference geometry whenever a conversion is needed and
//! dropped right after, so repeated zooming never accumulates scaling drift.

use super::geometry::{ClientPoint, DevicePoint, DocPoint, PageGeometry};
use super::viewport::Viewport;

/// Largest edge, in pixels, of a surface backing a single page
pub const MAX_SURFACE_DIMENSION: f32 = 8192.0;

/// Scale factors derived from viewport state and reference page width
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    container_ratio: f32,
    zoom: f32,
    pixel_density: f32,
}

impl Transform {
    #[must_use]
    pub fn new(viewport: &Viewport, reference: &PageGeometry, padding: f32) -> Self {
        let usable_width = (viewport.width - 2.0 * padding).max(1.0);
        let container_ratio = usable_width / reference.width.max(f32::EPSILON);
        Self {
            container_ratio,
            zoom: viewport.zoom_factor(),
            pixel_density: viewport.pixel_density,
        }
    }

    /// Document units to CSS pixels
    #[must_use]
    pub fn css_scale(&self) -> f32 {
        self.container_ratio * self.zoom
    }

    /// Document units to device pixels
    #[must_use]
    pub fn device_scale(&self) -> f32 {
        self.css_scale() * self.pixel_density
    }

    #[must_use]
    pub fn to_screen(&self, p: DocPoint) -> DevicePoint {
        let s = self.device_scale();
        DevicePoint::new(p.x * s, p.y * s)
    }

    #[must_use]
    pub fn to_document(&self, p: DevicePoint) -> DocPoint {
        let s = self.device_scale();
        DocPoint::new(p.x / s, p.y / s)
    }

    /// Raster scale for page surfaces: the device scale, reduced so neither
    /// edge of the reference page exceeds [`MAX_SURFACE_DIMENSION`].
    #[must_use]
    pub fn raster_scale(&self, reference: &PageGeometry) -> f32 {
        let scale = self.device_scale();
        let max_dim = reference.width.max(reference.height) * scale;
        if max_dim > MAX_SURFACE_DIMENSION {
            scale * (MAX_SURFACE_DIMENSION / max_dim)
        } else {
            scale
        }
    }

    /// Pixel size of a page surface at [`Self::raster_scale`]
    #[must_use]
    pub fn surface_size(&self, reference: &PageGeometry) -> (u32, u32) {
        let scale = self.raster_scale(reference);
        let width = (reference.width * scale).round().max(1.0) as u32;
        let height = (reference.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// Vertical layout of the page column in CSS pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowLayout {
    pub padding: f32,
    pub page_width: f32,
    pub page_height: f32,
    /// Page height plus inter-row gap
    pub row_height: f32,
}

impl RowLayout {
    #[must_use]
    pub fn new(transform: &Transform, reference: &PageGeometry, padding: f32, gap: f32) -> Self {
        let scale = transform.css_scale();
        let page_height = reference.height * scale;
        Self {
            padding,
            page_width: reference.width * scale,
            page_height,
            row_height: (page_height + gap).max(1.0),
        }
    }

    /// Screen offset of a page's top edge within the scroll content
    #[must_use]
    pub fn page_top(&self, page: usize) -> f32 {
        self.padding + page as f32 * self.row_height
    }

    #[must_use]
    pub fn first_visible(&self, scroll_top: f32) -> usize {
        ((scroll_top - self.padding).max(0.0) / self.row_height).floor() as usize
    }

    /// Number of rows covering one viewport height
    #[must_use]
    pub fn look_ahead(&self, viewport_height: f32) -> usize {
        ((viewport_height / self.row_height).ceil() as usize).max(1)
    }

    #[must_use]
    pub fn content_height(&self, page_count: usize) -> f32 {
        2.0 * self.padding + page_count as f32 * self.row_height
    }

    #[must_use]
    pub fn content_width(&self) -> f32 {
        2.0 * self.padding + self.page_width
    }

    /// Map a client point to a page and the CSS offset inside that page.
    ///
    /// Points in the padding or in the gap between rows resolve to nothing.
    #[must_use]
    pub fn locate(
        &self,
        client: ClientPoint,
        viewport: &Viewport,
        page_count: usize,
    ) -> Option<(usize, f32, f32)> {
        let content_x = viewport.scroll_left + client.x - self.padding;
        let content_y = viewport.scroll_top + client.y - self.padding;
        if content_y < 0.0 || content_x < 0.0 || content_x > self.page_width {
            return None;
        }
        let page = (content_y / self.row_height).floor() as usize;
        if page >= page_count {
            return None;
        }
        let within_y = content_y - page as f32 * self.row_height;
        if within_y > self.page_height {
            return None;
        }
        Some((page, content_x, within_y))
    }
}
