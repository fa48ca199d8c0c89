//! Viewport state: visible size, scroll offsets, zoom and pixel density
//!
//! Owned exclusively by the engine and mutated by resize, zoom and scroll
//! events. Never persisted.

use super::config::EngineConfig;

/// Scroll/zoom state of the page column
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Visible width in CSS pixels
    pub width: f32,
    /// Visible height in CSS pixels
    pub height: f32,
    /// Vertical scroll offset in CSS pixels
    pub scroll_top: f32,
    /// Horizontal scroll offset in CSS pixels
    pub scroll_left: f32,
    /// Zoom factor in percent (100 = fit width)
    pub zoom_percent: f32,
    /// Device pixels per CSS pixel, never below 1
    pub pixel_density: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            scroll_top: 0.0,
            scroll_left: 0.0,
            zoom_percent: 100.0,
            pixel_density: 1.0,
        }
    }
}

impl Viewport {
    #[must_use]
    pub fn new(width: f32, height: f32, pixel_density: f32) -> Self {
        Self {
            width: sanitize_extent(width),
            height: sanitize_extent(height),
            pixel_density: clamp_density(pixel_density),
            ..Self::default()
        }
    }

    /// Zoom factor as a multiplier (1.0 = 100%)
    #[must_use]
    pub fn zoom_factor(&self) -> f32 {
        self.zoom_percent / 100.0
    }

    /// Set the visible size and density. Returns true if anything changed.
    pub fn resize(&mut self, width: f32, height: f32, pixel_density: f32) -> bool {
        let width = sanitize_extent(width);
        let height = sanitize_extent(height);
        let pixel_density = clamp_density(pixel_density);
        let changed = (self.width - width).abs() > f32::EPSILON
            || (self.height - height).abs() > f32::EPSILON
            || (self.pixel_density - pixel_density).abs() > f32::EPSILON;
        self.width = width;
        self.height = height;
        self.pixel_density = pixel_density;
        changed
    }

    /// Set the zoom percentage, clamped. Returns true if it changed.
    pub fn set_zoom(&mut self, percent: f32, config: &EngineConfig) -> bool {
        let clamped = config.clamp_zoom(percent);
        if (self.zoom_percent - clamped).abs() > f32::EPSILON {
            self.zoom_percent = clamped;
            true
        } else {
            false
        }
    }

    /// Zoom in by one step
    pub fn step_in(&mut self, config: &EngineConfig) -> bool {
        self.set_zoom(self.zoom_percent + config.zoom_step, config)
    }

    /// Zoom out by one step
    pub fn step_out(&mut self, config: &EngineConfig) -> bool {
        self.set_zoom(self.zoom_percent - config.zoom_step, config)
    }

    /// Set both scroll offsets, clamped to `[0, max]`. Returns true if they changed.
    pub fn scroll_to(&mut self, top: f32, left: f32, max_top: f32, max_left: f32) -> bool {
        let top = clamp_offset(top, max_top);
        let left = clamp_offset(left, max_left);
        let changed = (self.scroll_top - top).abs() > f32::EPSILON
            || (self.scroll_left - left).abs() > f32::EPSILON;
        self.scroll_top = top;
        self.scroll_left = left;
        changed
    }
}

fn clamp_offset(value: f32, max: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, max.max(0.0))
}

fn sanitize_extent(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Device pixel ratio, at least 1 (matches `max(devicePixelRatio, 1)` on the web)
#[must_use]
pub fn clamp_density(density: f32) -> f32 {
    if density.is_finite() {
        density.max(1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_steps_and_clamps() {
        let config = EngineConfig::default();
        let mut viewport = Viewport::default();

        assert!(viewport.step_in(&config));
        assert_eq!(viewport.zoom_percent, 110.0);

        viewport.zoom_percent = 15.0;
        assert!(viewport.step_out(&config));
        assert_eq!(viewport.zoom_percent, 10.0);
        assert!(!viewport.step_out(&config));
    }

    #[test]
    fn scroll_is_clamped() {
        let mut viewport = Viewport::default();
        assert!(viewport.scroll_to(5000.0, -20.0, 1200.0, 0.0));
        assert_eq!(viewport.scroll_top, 1200.0);
        assert_eq!(viewport.scroll_left, 0.0);
        assert!(!viewport.scroll_to(1300.0, 0.0, 1200.0, 0.0));
    }

    #[test]
    fn density_never_below_one() {
        let viewport = Viewport::new(800.0, 600.0, 0.5);
        assert_eq!(viewport.pixel_density, 1.0);
        assert_eq!(clamp_density(f32::NAN), 1.0);
        assert_eq!(clamp_density(2.0), 2.0);
    }
}
