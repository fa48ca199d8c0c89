//! Core geometry types shared by the viewport engine

use serde::{Deserialize, Serialize};

/// A point in document coordinates (page reference units, top-left origin)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// A point in device pixels on a page's bound surface
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DevicePoint {
    pub x: f32,
    pub y: f32,
}

impl DevicePoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A pointer position relative to the viewport's top-left corner, in CSS pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPoint {
    pub x: f32,
    pub y: f32,
}

impl ClientPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in document coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DocRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DocRect {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive containment, matching edge clicks on a stamp border
    #[must_use]
    pub fn contains(&self, p: DocPoint) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Width, height and rotation of a document page in reference units
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Clockwise rotation in degrees as declared by the document
    pub rotation: i32,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            rotation: 0,
        }
    }

    #[must_use]
    pub const fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Normalizes a rotation in degrees to `[0, 360)`
#[must_use]
pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_edges() {
        let rect = DocRect::new(10.0, 20.0, 100.0, 50.0);
        assert!(rect.contains(DocPoint::new(10.0, 20.0)));
        assert!(rect.contains(DocPoint::new(110.0, 70.0)));
        assert!(!rect.contains(DocPoint::new(110.1, 70.0)));
        assert!(!rect.contains(DocPoint::new(9.9, 30.0)));
    }

    #[test]
    fn rotation_normalizes_negative_values() {
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(0), 0);
    }
}
