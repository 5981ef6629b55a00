//! Display-space <-> native-space mapping for a (possibly scaled) image element.

use serde::{Deserialize, Serialize};
use shared::domain::{NativePoint, NaturalSize};

use crate::error::PreconditionError;

/// On-screen bounding rectangle of the displayed image, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

/// A laid-out image: where it sits on screen and how large it really is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageViewport {
    rect: DisplayRect,
    natural: NaturalSize,
}

impl ImageViewport {
    pub fn new(rect: DisplayRect, natural: NaturalSize) -> Result<Self, PreconditionError> {
        let laid_out = rect.width.is_finite()
            && rect.height.is_finite()
            && rect.width > 0.0
            && rect.height > 0.0;
        if !laid_out || natural.is_empty() {
            return Err(PreconditionError::ImageNotLaidOut);
        }
        Ok(Self { rect, natural })
    }

    /// Viewport that shows the image at its native size with its origin at (0, 0).
    pub fn identity(natural: NaturalSize) -> Result<Self, PreconditionError> {
        Self::new(
            DisplayRect::new(0.0, 0.0, f64::from(natural.width), f64::from(natural.height)),
            natural,
        )
    }

    pub fn rect(&self) -> DisplayRect {
        self.rect
    }

    pub fn natural(&self) -> NaturalSize {
        self.natural
    }

    pub fn to_native(&self, client_x: f64, client_y: f64) -> NativePoint {
        let x = (client_x - self.rect.left) * f64::from(self.natural.width) / self.rect.width;
        let y = (client_y - self.rect.top) * f64::from(self.natural.height) / self.rect.height;
        NativePoint::new(round_half_up(x), round_half_up(y))
    }

    /// Exact inverse of [`Self::to_native`]; no rounding so a marker drawn here
    /// maps back to the same native pixel.
    pub fn to_display(&self, point: NativePoint) -> DisplayPoint {
        DisplayPoint {
            x: self.rect.left
                + point.x as f64 * self.rect.width / f64::from(self.natural.width),
            y: self.rect.top
                + point.y as f64 * self.rect.height / f64::from(self.natural.height),
        }
    }
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[cfg(test)]
#[path = "tests/coordinates_tests.rs"]
mod tests;
