//! Edge auto-scroll while dragging a stamp
//!
//! While the pointer is pressed inside the border band of the viewport, each
//! animation frame scrolls toward the nearest edge(s) and re-runs the drag at
//! the same client position so the stamp follows the moving content.

use super::error::EngineError;
use super::geometry::ClientPoint;
use super::pointer::Interaction;
use super::state::{Effect, Effects, Engine};
use super::viewport::Viewport;

#[derive(Clone, Copy, Debug, Default)]
pub struct AutoScroll {
    pointer: Option<ClientPoint>,
    active: bool,
}

impl AutoScroll {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record the pointer position. Returns true if the loop just started and
    /// needs a first animation frame.
    pub fn track(&mut self, pointer: ClientPoint, viewport: &Viewport, border: f32) -> bool {
        self.pointer = Some(pointer);
        let near_edge = edge_direction(pointer, viewport, border) != (0.0, 0.0);
        let starting = near_edge && !self.active;
        self.active = near_edge;
        starting
    }

    pub fn stop(&mut self) {
        self.pointer = None;
        self.active = false;
    }
}

/// `-1`, `0` or `1` per axis, pointing at the edge(s) the pointer is close to
#[must_use]
pub fn edge_direction(pointer: ClientPoint, viewport: &Viewport, border: f32) -> (f32, f32) {
    let axis = |value: f32, extent: f32| {
        if value < border {
            -1.0
        } else if value > extent - border {
            1.0
        } else {
            0.0
        }
    };
    (axis(pointer.x, viewport.width), axis(pointer.y, viewport.height))
}

impl Engine {
    pub(super) fn animation_frame(&mut self, fx: &mut Effects) -> Result<(), EngineError> {
        if !self.autoscroll.is_active() {
            return Ok(());
        }
        let pointer = match self.autoscroll.pointer {
            Some(pointer) if self.interaction() == Interaction::Dragging => pointer,
            _ => {
                self.autoscroll.stop();
                return Ok(());
            }
        };
        let (dx, dy) = edge_direction(pointer, &self.viewport, self.config.autoscroll_border);
        if (dx, dy) == (0.0, 0.0) {
            self.autoscroll.stop();
            return Ok(());
        }

        let step = self.config.autoscroll_step;
        let top = self.viewport.scroll_top + dy * step;
        let left = self.viewport.scroll_left + dx * step;
        if self.apply_scroll(top, left, fx)? {
            fx.push(Effect::ScrollTo {
                top: self.viewport.scroll_top,
                left: self.viewport.scroll_left,
            });
        }
        self.drag_to(pointer, fx)?;
        fx.push(Effect::RequestAnimationFrame);
        Ok(())
    }
}
