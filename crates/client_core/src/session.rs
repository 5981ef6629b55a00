//! Session state owned by one controller, and the table of user intents that
//! transition it. Everything here is synchronous and free of I/O; submitting
//! goes through [`crate::upload`].

use serde::{Deserialize, Serialize};
use shared::domain::{NativePoint, NaturalSize, StyleMode};
use tracing::{debug, info};

use crate::{
    calibration::{CalibrationScope, CalibrationSession, Marker, OverlayPreview},
    coordinates::ImageViewport,
    error::ClientError,
    feedback::{self, PositionFeedback},
    form_state,
    media::{FileHandle, SelectedMedia},
    upload::{JobState, UploadJob},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub media: SelectedMedia,
    pub style: StyleMode,
    pub manual_positioning: bool,
    pub mouth_position: Option<NativePoint>,
    pub image_size: Option<NaturalSize>,
    pub calibration: CalibrationSession,
    pub job: UploadJob,
    /// Notice from the last failed or abandoned upload. Survives the form
    /// reset that follows a failure; cleared by the next submit or a reset.
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Intent {
    SelectImage(FileHandle),
    SelectAudio(FileHandle),
    SelectStyle(StyleMode),
    ToggleManual(bool),
    /// The host finished decoding the preview and knows its native size.
    ImageLoaded(NaturalSize),
    ClickImage {
        viewport: ImageViewport,
        client_x: f64,
        client_y: f64,
    },
    OpenCalibration,
    ClickCalibrationImage {
        viewport: ImageViewport,
        client_x: f64,
        client_y: f64,
    },
    PreviewDraft {
        viewport: ImageViewport,
    },
    ConfirmDraft,
    CancelCalibration,
    ResetPosition,
    Reset,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectImage(_) => "select_image",
            Self::SelectAudio(_) => "select_audio",
            Self::SelectStyle(_) => "select_style",
            Self::ToggleManual(_) => "toggle_manual",
            Self::ImageLoaded(_) => "image_loaded",
            Self::ClickImage { .. } => "click_image",
            Self::OpenCalibration => "open_calibration",
            Self::ClickCalibrationImage { .. } => "click_calibration_image",
            Self::PreviewDraft { .. } => "preview_draft",
            Self::ConfirmDraft => "confirm_draft",
            Self::CancelCalibration => "cancel_calibration",
            Self::ResetPosition => "reset_position",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// State changed; the host should re-project it.
    Applied,
    /// The intent is not available in the current state.
    Ignored,
    DraftUpdated(NativePoint),
    OverlayPreviewed(OverlayPreview),
    MouthCommitted(NativePoint),
    MouthCleared,
}

impl SessionState {
    pub fn new(style: StyleMode) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, intent: Intent) -> Result<Transition, ClientError> {
        debug!(intent = intent.name(), "applying intent");
        match intent {
            Intent::SelectImage(file) => {
                self.media.select_image(file)?;
                self.image_size = None;
                self.calibration.cancel();
                self.mouth_position = None;
                Ok(Transition::Applied)
            }
            Intent::SelectAudio(file) => {
                self.media.select_audio(file)?;
                Ok(Transition::Applied)
            }
            Intent::SelectStyle(style) => {
                // A committed position survives; it is simply not sent.
                self.style = style;
                if !form_state::calibration_interactive(style) {
                    self.calibration.cancel();
                }
                Ok(Transition::Applied)
            }
            Intent::ToggleManual(enabled) => {
                self.manual_positioning = enabled;
                if enabled {
                    return Ok(Transition::Applied);
                }
                Ok(self.clear_mouth_position())
            }
            Intent::ImageLoaded(size) => {
                if self.media.image.is_none() || size.is_empty() {
                    return Ok(Transition::Ignored);
                }
                self.image_size = Some(size);
                Ok(Transition::Applied)
            }
            Intent::ClickImage {
                viewport,
                client_x,
                client_y,
            } => {
                if !self.direct_click_enabled() {
                    return Ok(Transition::Ignored);
                }
                let point = viewport.to_native(client_x, client_y);
                self.image_size = Some(viewport.natural());
                Ok(self.commit_mouth_position(point))
            }
            Intent::OpenCalibration => {
                if !form_state::calibration_interactive(self.style) {
                    return Ok(Transition::Ignored);
                }
                self.calibration.open(&self.media)?;
                Ok(Transition::Applied)
            }
            Intent::ClickCalibrationImage {
                viewport,
                client_x,
                client_y,
            } => {
                let Some(point) = self.calibration.click(&viewport, client_x, client_y) else {
                    return Ok(Transition::Ignored);
                };
                self.image_size = Some(viewport.natural());
                Ok(Transition::DraftUpdated(point))
            }
            Intent::PreviewDraft { viewport } => Ok(self
                .calibration
                .preview(&viewport)
                .map_or(Transition::Ignored, Transition::OverlayPreviewed)),
            Intent::ConfirmDraft => match self.calibration.confirm() {
                Some(point) => Ok(self.commit_mouth_position(point)),
                None => Ok(Transition::Ignored),
            },
            Intent::CancelCalibration => {
                if !self.calibration.is_open() {
                    return Ok(Transition::Ignored);
                }
                self.calibration.cancel();
                Ok(Transition::Applied)
            }
            Intent::ResetPosition => Ok(self.clear_mouth_position()),
            Intent::Reset => {
                if self.job.is_in_flight() {
                    return Ok(Transition::Ignored);
                }
                self.reset_form();
                Ok(Transition::Applied)
            }
        }
    }

    /// Back to the initial empty condition. The style is external
    /// configuration and survives.
    pub fn reset_form(&mut self) {
        info!("resetting form state");
        *self = Self::new(self.style);
    }

    pub fn direct_click_enabled(&self) -> bool {
        form_state::calibration_interactive(self.style) && self.manual_positioning
    }

    /// Position sent with a submit: only for the standard style.
    pub fn effective_mouth_position(&self) -> Option<NativePoint> {
        self.mouth_position
            .filter(|_| self.style.supports_manual_anchor())
    }

    pub fn feedback(&self) -> Option<PositionFeedback> {
        feedback::classify(self.mouth_position, self.image_size?)
    }

    pub fn committed_marker(&self, viewport: &ImageViewport) -> Option<Marker> {
        let anchor = self.mouth_position?;
        Some(Marker {
            scope: CalibrationScope::Committed,
            anchor,
            display: viewport.to_display(anchor),
        })
    }

    pub fn job_state(&self) -> JobState {
        self.job.state
    }

    fn commit_mouth_position(&mut self, point: NativePoint) -> Transition {
        info!(x = point.x, y = point.y, "mouth position set");
        self.mouth_position = Some(point);
        Transition::MouthCommitted(point)
    }

    fn clear_mouth_position(&mut self) -> Transition {
        if self.mouth_position.take().is_some() {
            Transition::MouthCleared
        } else {
            Transition::Applied
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
