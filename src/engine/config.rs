//! Engine tunables

use super::geometry::DocPoint;

/// Layout, zoom and interaction parameters of the viewport engine.
///
/// Built from the user settings file by [`crate::settings::engine_config`];
/// tests construct it directly.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Padding around the page column in CSS pixels
    pub padding: f32,
    /// Vertical gap between consecutive pages in CSS pixels
    pub row_gap: f32,
    /// Zoom percentage applied when a document is loaded
    pub initial_zoom: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Percentage points added or removed by one zoom step
    pub zoom_step: f32,
    /// Width of a stamp at scale 1, in document units
    pub stamp_width: f32,
    /// Where newly placed stamps land on their page
    pub default_stamp_position: DocPoint,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Offset applied to both axes of a duplicated stamp
    pub duplicate_offset: f32,
    /// Distance from a viewport edge that starts auto-scrolling during a drag
    pub autoscroll_border: f32,
    /// Scroll distance per animation frame while auto-scrolling
    pub autoscroll_step: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            padding: 10.0,
            row_gap: 10.0,
            initial_zoom: 100.0,
            min_zoom: 10.0,
            max_zoom: 1000.0,
            zoom_step: 10.0,
            stamp_width: 100.0,
            default_stamp_position: DocPoint::new(50.0, 50.0),
            min_scale: 0.2,
            max_scale: 5.0,
            duplicate_offset: 10.0,
            autoscroll_border: 32.0,
            autoscroll_step: 12.0,
        }
    }
}

impl EngineConfig {
    /// Clamp zoom to the configured range, handling NaN/Inf
    #[must_use]
    pub fn clamp_zoom(&self, percent: f32) -> f32 {
        if percent.is_finite() {
            percent.clamp(self.min_zoom, self.max_zoom)
        } else {
            self.initial_zoom
        }
    }

    /// Clamp a stamp scale to the configured range, handling NaN/Inf
    #[must_use]
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if scale.is_finite() {
            scale.clamp(self.min_scale, self.max_scale)
        } else {
            1.0
        }
    }
}
