//! Mapping stamps from top-left document coordinates into PDF user space

use crate::engine::geometry::{DocRect, normalize_rotation};

/// Declared size and rotation of an output page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputPage {
    pub width: f32,
    pub height: f32,
    /// Clockwise `/Rotate` in degrees
    pub rotation: i32,
}

/// Where and how to draw an image on an output page.
///
/// `(x, y)` is the image origin in bottom-left PDF user space; `rotate` is a
/// counter-clockwise rotation in degrees about that origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotate: i32,
}

impl Placement {
    /// Content stream `cm` operands mapping the unit square onto this placement
    #[must_use]
    pub fn matrix(&self) -> [f32; 6] {
        match self.rotate {
            90 => [0.0, self.width, -self.height, 0.0, self.x, self.y],
            _ => [self.width, 0.0, 0.0, self.height, self.x, self.y],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("page rotation {0} is not supported")]
pub struct UnsupportedRotation(pub i32);

/// Project a stamp rectangle on a page into that page's user space.
///
/// Only unrotated and 90° pages are handled.
pub fn project(bounds: DocRect, page: &OutputPage) -> Result<Placement, UnsupportedRotation> {
    match normalize_rotation(page.rotation) {
        0 => Ok(Placement {
            x: bounds.x,
            y: page.height - bounds.y - bounds.height,
            width: bounds.width,
            height: bounds.height,
            rotate: 0,
        }),
        90 => Ok(Placement {
            x: bounds.y + bounds.height,
            y: bounds.x,
            width: bounds.width,
            height: bounds.height,
            rotate: 90,
        }),
        _ => Err(UnsupportedRotation(page.rotation)),
    }
}
