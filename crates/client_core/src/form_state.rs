//! Which controls are usable, derived from session state.

use serde::{Deserialize, Serialize};
use shared::domain::StyleMode;

use crate::{media::SelectedMedia, session::SessionState, upload::JobState};

/// Submit needs both files; calibration is always optional.
pub fn can_submit(media: &SelectedMedia) -> bool {
    media.is_complete()
}

pub fn calibration_interactive(style: StyleMode) -> bool {
    style.supports_manual_anchor()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub can_submit: bool,
    pub can_test_submit: bool,
    pub submit_in_flight: bool,
    pub calibration_interactive: bool,
    pub direct_click_enabled: bool,
    pub can_confirm_draft: bool,
    pub can_preview_draft: bool,
    pub can_download: bool,
}

impl ControlState {
    pub fn derive(state: &SessionState) -> Self {
        let ready = can_submit(&state.media);
        Self {
            can_submit: ready,
            can_test_submit: ready,
            submit_in_flight: state.job.is_in_flight(),
            calibration_interactive: calibration_interactive(state.style),
            direct_click_enabled: state.direct_click_enabled(),
            can_confirm_draft: state.calibration.can_confirm(),
            can_preview_draft: state.calibration.can_preview(),
            can_download: state.job.state == JobState::Complete
                && state.job.result_video_url.is_some(),
        }
    }
}
