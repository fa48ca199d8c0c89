//! Pointer interaction: modes, selection and dragging

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::geometry::{ClientPoint, DocPoint};
use super::overlay::StampId;
use super::state::{Effect, Effects, Engine};

/// How pointer input on the page column is interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerMode {
    /// Native scrolling; stamps are not interactive
    Pan,
    /// Hit-testing and dragging of stamps
    Select,
    /// Entered from a pen press; behaves like `Select` until the pointer is released
    ExternalCapture,
}

impl PointerMode {
    #[must_use]
    pub fn allows_selection(self) -> bool {
        matches!(self, Self::Select | Self::ExternalCapture)
    }

    /// Mode suggested by the device that pressed the document entry point
    #[must_use]
    pub fn for_entry(kind: PointerKind) -> Self {
        match kind {
            PointerKind::Touch => Self::Pan,
            PointerKind::Pen => Self::ExternalCapture,
            PointerKind::Mouse => Self::Select,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interaction {
    Idle,
    Dragging,
}

/// The selected stamp and drag state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub stamp: StampId,
    /// Pointer position minus stamp origin at press time
    pub offset: DocPoint,
    pub pressed: bool,
}

impl Selection {
    #[must_use]
    pub fn new(stamp: StampId) -> Self {
        Self {
            stamp,
            offset: DocPoint::default(),
            pressed: false,
        }
    }
}

/// Which UI controls should be shown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlVisibility {
    pub mode: PointerMode,
    /// Native scroll gestures enabled on the page column
    pub native_scroll: bool,
    /// Duplicate, delete and resize
    pub selection_tools: bool,
    /// Zoom, place stamp and download
    pub document_tools: bool,
}

impl ControlVisibility {
    #[must_use]
    pub fn compute(mode: PointerMode, has_selection: bool, has_document: bool) -> Self {
        Self {
            mode,
            native_scroll: mode == PointerMode::Pan,
            selection_tools: has_selection && mode.allows_selection(),
            document_tools: has_document,
        }
    }
}

impl Engine {
    #[must_use]
    pub fn interaction(&self) -> Interaction {
        match self.selection {
            Some(Selection { pressed: true, .. }) => Interaction::Dragging,
            _ => Interaction::Idle,
        }
    }

    pub(super) fn pointer_down(
        &mut self,
        position: ClientPoint,
        fx: &mut Effects,
    ) -> Result<(), EngineError> {
        self.require_document()?;
        if !self.mode.allows_selection() {
            return Ok(());
        }

        self.set_selection(None, fx);
        let Some((page, point)) = self.locate(position) else {
            return Ok(());
        };
        let Some(id) = self.overlay.hit_test(page, point, self.config.stamp_width) else {
            return Ok(());
        };

        let now = self.tick();
        let stamp = self.overlay.get_mut(id).ok_or(EngineError::UnknownStamp(id))?;
        stamp.last_interacted_at = now;
        let offset = point.sub(stamp.position);
        debug!("Pressed stamp {id} on page {page}");

        self.set_selection(
            Some(Selection {
                stamp: id,
                offset,
                pressed: true,
            }),
            fx,
        );
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }

    pub(super) fn pointer_move(
        &mut self,
        position: ClientPoint,
        fx: &mut Effects,
    ) -> Result<(), EngineError> {
        self.require_document()?;
        if self.interaction() != Interaction::Dragging {
            return Ok(());
        }
        if self
            .autoscroll
            .track(position, &self.viewport, self.config.autoscroll_border)
        {
            fx.push(Effect::RequestAnimationFrame);
        }
        self.drag_to(position, fx)
    }

    /// Move the pressed stamp under `position`, reassigning its page if the
    /// pointer is now over a different one
    pub(super) fn drag_to(
        &mut self,
        position: ClientPoint,
        fx: &mut Effects,
    ) -> Result<(), EngineError> {
        let Some(selection) = self.selection.filter(|s| s.pressed) else {
            return Ok(());
        };
        let Some((page, point)) = self.locate(position) else {
            return Ok(());
        };
        let stamp = self
            .overlay
            .get_mut(selection.stamp)
            .ok_or(EngineError::UnknownStamp(selection.stamp))?;

        let previous_page = stamp.page;
        stamp.position = point.sub(selection.offset);
        stamp.page = page;
        if previous_page != page {
            debug!(
                "Stamp {} moved from page {previous_page} to {page}",
                selection.stamp
            );
            fx.push(Effect::RepaintOverlay(previous_page));
        }
        fx.push(Effect::RepaintOverlay(page));
        Ok(())
    }

    pub(super) fn pointer_up(&mut self, fx: &mut Effects) -> Result<(), EngineError> {
        self.require_document()?;
        self.autoscroll.stop();
        if let Some(selection) = self.selection.as_mut() {
            if selection.pressed {
                selection.pressed = false;
                self.overlay.sort_by_recency();
            }
        }
        if self.mode == PointerMode::ExternalCapture {
            self.set_mode(PointerMode::Select, fx);
        }
        Ok(())
    }
}
