//! Parameter types for image operations.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality on the 0–12 scale photo editors expose, mapped
//!   onto the encoder's 1–100 range.
//! - [`OverlayColor`]: an sRGB triple used as the caption fill color.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Highest value on the 0–12 quality scale.
pub const MAX_QUALITY: u8 = 12;

/// JPEG quality on the 0–12 scale (12 = best).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.min(MAX_QUALITY))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Map onto the JPEG encoder's 1–100 scale.
    ///
    /// 0 → 10, 6 → 55, 12 → 100. Linear in between, rounded.
    pub fn to_jpeg(self) -> u8 {
        let q = self.0 as u32;
        (10 + (q * 90 + 6) / 12) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(MAX_QUALITY)
    }
}

/// Fill color for the text slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OverlayColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl OverlayColor {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

impl fmt::Display for OverlayColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({},{},{})", self.red, self.green, self.blue)
    }
}

impl FromStr for OverlayColor {
    type Err = String;

    /// Parse `#rrggbb` or `#rgb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{s}' must start with '#'"))?;
        if !hex.is_ascii() {
            return Err(format!("invalid hex color '{s}'"));
        }
        let channel = |digits: &str| {
            u8::from_str_radix(digits, 16).map_err(|_| format!("invalid hex color '{s}'"))
        };
        match hex.len() {
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => Err(format!("invalid hex color '{s}'")),
        }
    }
}

impl Serialize for OverlayColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OverlayColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
