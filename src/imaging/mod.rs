//! Image processing in pure Rust, built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, TIFF, GIF) |
//! | **Fit** | `DynamicImage::resize_exact` with Lanczos3 |
//! | **Encode** | `JpegEncoder` at a 0–12 quality mapped to 10–100 |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for fit and centering math (unit testable)
//! - **Parameters**: Quality and overlay color value types
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Asset loading and fitting on top of the backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    GeometryError, Placement, SlotBounds, center_offset, fit_scale, fitted_dimensions,
};
pub use operations::{
    FitError, FittedAsset, LoadError, PrepareError, SourceAsset, fit, load, prepare,
};
pub use params::{MAX_QUALITY, OverlayColor, Quality};
pub use rust_backend::{RustBackend, supported_input_extensions};
