//! Modal point-and-click calibration of the mouth anchor.
//!
//! The draft lives only while the modal is open. Confirming hands it to the
//! caller, which commits it to the session's mouth position.

use serde::{Deserialize, Serialize};
use shared::domain::NativePoint;
use tracing::debug;

use crate::{
    coordinates::{DisplayPoint, ImageViewport},
    error::PreconditionError,
    media::SelectedMedia,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    #[default]
    Closed,
    Open,
    Drafting,
    PreviewingDraft,
}

/// Which value a marker represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationScope {
    Draft,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub scope: CalibrationScope,
    pub anchor: NativePoint,
    pub display: DisplayPoint,
}

/// Non-authoritative mock of the mouth overlay at the draft position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayPreview {
    pub anchor: NativePoint,
    pub display: DisplayPoint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    phase: CalibrationPhase,
    draft: Option<NativePoint>,
}

impl CalibrationSession {
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn draft(&self) -> Option<NativePoint> {
        self.draft
    }

    pub fn is_open(&self) -> bool {
        self.phase != CalibrationPhase::Closed
    }

    pub fn can_confirm(&self) -> bool {
        self.is_open() && self.draft.is_some()
    }

    pub fn can_preview(&self) -> bool {
        self.can_confirm()
    }

    /// Opens with a fresh, empty draft. A committed position is not pre-loaded.
    pub fn open(&mut self, media: &SelectedMedia) -> Result<(), PreconditionError> {
        if media.image.is_none() {
            return Err(PreconditionError::NoImageSelected);
        }
        self.phase = CalibrationPhase::Open;
        self.draft = None;
        Ok(())
    }

    /// Records a click on the modal's own display of the image.
    pub fn click(
        &mut self,
        viewport: &ImageViewport,
        client_x: f64,
        client_y: f64,
    ) -> Option<NativePoint> {
        if !self.is_open() {
            return None;
        }
        let point = viewport.to_native(client_x, client_y);
        debug!(x = point.x, y = point.y, "calibration draft updated");
        self.draft = Some(point);
        self.phase = CalibrationPhase::Drafting;
        Some(point)
    }

    pub fn preview(&mut self, viewport: &ImageViewport) -> Option<OverlayPreview> {
        let anchor = self.draft.filter(|_| self.is_open())?;
        self.phase = CalibrationPhase::PreviewingDraft;
        Some(OverlayPreview {
            anchor,
            display: viewport.to_display(anchor),
        })
    }

    /// Closes the session and returns the draft to commit. Without a draft
    /// this is a no-op and the session stays open.
    pub fn confirm(&mut self) -> Option<NativePoint> {
        if !self.can_confirm() {
            return None;
        }
        let confirmed = self.draft.take();
        self.phase = CalibrationPhase::Closed;
        confirmed
    }

    pub fn cancel(&mut self) {
        self.draft = None;
        self.phase = CalibrationPhase::Closed;
    }

    pub fn draft_marker(&self, viewport: &ImageViewport) -> Option<Marker> {
        let anchor = self.draft.filter(|_| self.is_open())?;
        Some(Marker {
            scope: CalibrationScope::Draft,
            anchor,
            display: viewport.to_display(anchor),
        })
    }
}

#[cfg(test)]
#[path = "tests/calibration_tests.rs"]
mod tests;
