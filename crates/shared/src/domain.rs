use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rendering template requested from the service. Only `Standard` accepts a
/// manual mouth anchor; the others always place the mouth server-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleMode {
    Standard,
    #[default]
    Canadian,
    Nutcracker,
}

impl StyleMode {
    pub const ALL: [StyleMode; 3] = [Self::Standard, Self::Canadian, Self::Nutcracker];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Canadian => "canadian",
            Self::Nutcracker => "nutcracker",
        }
    }

    pub fn supports_manual_anchor(self) -> bool {
        self == Self::Standard
    }
}

impl fmt::Display for StyleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown style '{0}' (expected standard, canadian or nutcracker)")]
pub struct UnknownStyle(pub String);

impl FromStr for StyleMode {
    type Err = UnknownStyle;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == normalized)
            .ok_or_else(|| UnknownStyle(raw.to_string()))
    }
}

/// Pixel coordinate in the native resolution of the selected image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativePoint {
    pub x: i64,
    pub y: i64,
}

impl NativePoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for NativePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Native (undecoded) resolution of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalSize {
    pub width: u32,
    pub height: u32,
}

impl NaturalSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
