//! Qualitative guidance for a mouth anchor. Heuristic thresholds only; out of
//! bounds warns but never blocks a submit.

use serde::{Deserialize, Serialize};
use shared::domain::{NativePoint, NaturalSize};

const TOO_HIGH_RATIO: f64 = 0.33;
const TOO_LOW_RATIO: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSeverity {
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionFeedback {
    OutOfBounds,
    TooHigh,
    TooLow,
    LooksGood,
}

impl PositionFeedback {
    pub fn severity(self) -> FeedbackSeverity {
        match self {
            Self::OutOfBounds => FeedbackSeverity::Warning,
            Self::TooHigh | Self::TooLow => FeedbackSeverity::Info,
            Self::LooksGood => FeedbackSeverity::Success,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::OutOfBounds => "Position is outside the image bounds",
            Self::TooHigh => "Position seems high for a mouth",
            Self::TooLow => "Position seems low for a mouth",
            Self::LooksGood => "Mouth position looks good",
        }
    }
}

pub fn classify(point: Option<NativePoint>, size: NaturalSize) -> Option<PositionFeedback> {
    let point = point?;
    let (width, height) = (i64::from(size.width), i64::from(size.height));
    if point.x < 0 || point.x > width || point.y < 0 || point.y > height {
        return Some(PositionFeedback::OutOfBounds);
    }

    let y = point.y as f64;
    let height = f64::from(size.height);
    if y < TOO_HIGH_RATIO * height {
        Some(PositionFeedback::TooHigh)
    } else if y > TOO_LOW_RATIO * height {
        Some(PositionFeedback::TooLow)
    } else {
        Some(PositionFeedback::LooksGood)
    }
}
