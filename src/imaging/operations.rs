//! High-level image operations.
//!
//! These functions combine calculations with backend execution: [`load`]
//! decodes a source file into a [`SourceAsset`], [`fit`] rescales it into a
//! [`FittedAsset`] ready for the photo slot.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{GeometryError, fit_scale, fitted_dimensions};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on a fitted raster's pixel count (100 megapixels).
pub const MAX_FITTED_PIXELS: u64 = 100_000_000;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unreadable asset {path}: {source}")]
    UnreadableAsset {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

#[derive(Error, Debug)]
pub enum FitError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("Resample to {width}x{height} failed: {reason}")]
    ResampleFailure {
        width: u32,
        height: u32,
        reason: String,
    },
}

/// A decoded source image. Lives for one pipeline pass.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub raster: DynamicImage,
    pub dimensions: Dimensions,
}

/// A source raster rescaled by a single uniform ratio.
#[derive(Debug, Clone)]
pub struct FittedAsset {
    pub path: PathBuf,
    pub raster: RgbaImage,
    pub ratio: f64,
    pub width: u32,
    pub height: u32,
}

/// Decode `path` through the backend.
pub fn load(backend: &impl ImageBackend, path: &Path) -> Result<SourceAsset, LoadError> {
    let raster = backend
        .decode(path)
        .map_err(|source| LoadError::UnreadableAsset {
            path: path.to_path_buf(),
            source,
        })?;
    let dimensions = Dimensions {
        width: raster.width(),
        height: raster.height(),
    };
    Ok(SourceAsset {
        path: path.to_path_buf(),
        raster,
        dimensions,
    })
}

/// Rescale `asset` to fit inside `target_w` x `target_h`, preserving aspect ratio.
///
/// Uses `min(target_w / w, target_h / h)` with no clamp at 1.0, so small
/// sources are scaled up to fill the box. Lanczos3 resampling.
pub fn fit(asset: SourceAsset, target_w: u32, target_h: u32) -> Result<FittedAsset, FitError> {
    let Dimensions { width, height } = asset.dimensions;
    let ratio = fit_scale(width, height, target_w, target_h)?;
    let (w, h) = fitted_dimensions(width, height, ratio);

    let pixels = (w as u64) * (h as u64);
    if pixels > MAX_FITTED_PIXELS {
        return Err(FitError::ResampleFailure {
            width: w,
            height: h,
            reason: format!("{pixels} pixels exceeds the {MAX_FITTED_PIXELS} pixel limit"),
        });
    }

    let raster = if (w, h) == (width, height) {
        asset.raster.into_rgba8()
    } else {
        asset.raster.resize_exact(w, h, FilterType::Lanczos3).into_rgba8()
    };

    Ok(FittedAsset {
        path: asset.path,
        raster,
        ratio,
        width: w,
        height: h,
    })
}

/// Load and fit in one step: the unit of work of the parallel stage.
pub fn prepare(
    backend: &impl ImageBackend,
    path: &Path,
    target_w: u32,
    target_h: u32,
) -> Result<FittedAsset, PrepareError> {
    let asset = load(backend, path)?;
    Ok(fit(asset, target_w, target_h)?)
}

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Fit(#[from] FitError),
}
