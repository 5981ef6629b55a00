use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const UPLOAD_PATH: &str = "/upload";
pub const TEST_UPLOAD_PATH: &str = "/test-upload";
pub const HEALTH_PATH: &str = "/health";

pub const FIELD_IMAGE: &str = "image";
pub const FIELD_AUDIO: &str = "audio";
pub const FIELD_STYLE: &str = "style";
pub const FIELD_MOUTH_X: &str = "mouth_x";
pub const FIELD_MOUTH_Y: &str = "mouth_y";

/// 2xx body of `POST /upload`. `success` is required; a body without it is
/// not the expected shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn rendered(video_url: impl Into<String>) -> Self {
        Self {
            success: true,
            video_url: Some(video_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            video_url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedFile {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Echo returned by `POST /test-upload`. Every field is optional because the
/// diagnostic endpoint is only inspected, never acted upon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestUploadResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub files_received: BTreeMap<String, ReceivedFile>,
    #[serde(default)]
    pub form_data: BTreeMap<String, String>,
    #[serde(default)]
    pub total_files: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}
