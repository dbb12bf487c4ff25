//! Pure calculation functions for fit and placement geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid dimensions: source {src_w}x{src_h}, target {dst_w}x{dst_h}")]
    InvalidDimensions {
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
    },
}

/// A rectangular region of the canvas, in canvas pixels.
///
/// `right` and `bottom` are exclusive, so a slot at `(40, 40)-(840, 840)` is
/// 800 pixels wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBounds {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl SlotBounds {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Bounds covering a whole `width` x `height` canvas.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i64, height as i64)
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Canvas position of an occupant's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
}

/// Uniform scale ratio that fits a source box inside a target box.
///
/// Returns `min(dst_w / src_w, dst_h / src_h)`. The ratio is not clamped to
/// 1.0: sources smaller than the target are scaled up to fill it.
///
/// # Examples
/// ```
/// # use instaframe::imaging::fit_scale;
/// assert_eq!(fit_scale(1600, 1200, 800, 800).unwrap(), 0.5);
/// assert_eq!(fit_scale(400, 400, 800, 800).unwrap(), 2.0);
/// ```
pub fn fit_scale(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<f64, GeometryError> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Err(GeometryError::InvalidDimensions {
            src_w,
            src_h,
            dst_w,
            dst_h,
        });
    }
    let ratio_w = dst_w as f64 / src_w as f64;
    let ratio_h = dst_h as f64 / src_h as f64;
    Ok(ratio_w.min(ratio_h))
}

/// Pixel dimensions of a source scaled by `ratio`, rounded to the nearest pixel.
///
/// Neither side collapses below one pixel, so extreme aspect ratios still
/// produce a drawable raster.
pub fn fitted_dimensions(src_w: u32, src_h: u32, ratio: f64) -> (u32, u32) {
    let w = (src_w as f64 * ratio).round().max(1.0) as u32;
    let h = (src_h as f64 * ratio).round().max(1.0) as u32;
    (w, h)
}

/// Placement that centers a `content_w` x `content_h` raster within `slot`.
///
/// Odd leftover space puts the extra pixel on the right/bottom margin.
/// Content larger than the slot overflows it equally on both sides.
pub fn center_offset(slot: SlotBounds, content_w: u32, content_h: u32) -> Placement {
    let spare_w = slot.width() - content_w as i64;
    let spare_h = slot.height() - content_h as i64;
    Placement {
        x: slot.left + spare_w.div_euclid(2),
        y: slot.top + spare_h.div_euclid(2),
    }
}
