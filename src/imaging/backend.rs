//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between the pipeline and the raw
//! codecs: decode a source file into a raster, encode a flattened canvas as
//! JPEG. Everything above this trait (fitting, compositing, batching) is
//! codec-agnostic and can be exercised with the mock in the tests module.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image` crate.

use super::params::Quality;
use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Pixel dimensions of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for codec backends.
///
/// `Sync` because decoding runs on the rayon pool while encoding runs on the
/// serialized stage, both through the same backend reference.
pub trait ImageBackend: Sync {
    /// Decode an image file into memory.
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError>;

    /// Encode a flattened canvas as JPEG and write it to `output`.
    fn encode_jpeg(
        &self,
        image: &RgbImage,
        quality: Quality,
        output: &Path,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock backend that serves synthetic rasters by file name and records
    /// every call. Uses Mutex (not RefCell) so it is Sync and works with rayon.
    #[derive(Default)]
    pub struct MockBackend {
        pub sources: Mutex<HashMap<String, Dimensions>>,
        pub failing_encodes: Mutex<Vec<String>>,
        pub slow_decodes: Mutex<HashMap<String, Duration>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        pub last_encoded: Mutex<Option<RgbImage>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode(String),
        Encode {
            output: String,
            width: u32,
            height: u32,
            quality: u8,
        },
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serve a solid raster of the given size for each listed file name.
        /// Names not listed fail to decode.
        pub fn with_sources(sources: &[(&str, u32, u32)]) -> Self {
            let map = sources
                .iter()
                .map(|&(name, width, height)| (name.to_string(), Dimensions { width, height }))
                .collect();
            Self {
                sources: Mutex::new(map),
                ..Self::default()
            }
        }

        /// Make encoding fail for any output whose path contains `needle`.
        pub fn fail_encode_for(self, needle: &str) -> Self {
            self.failing_encodes.lock().unwrap().push(needle.to_string());
            self
        }

        /// Make decoding `name` take at least `delay`.
        pub fn slow_decode_for(self, name: &str, delay: Duration) -> Self {
            self.slow_decodes
                .lock()
                .unwrap()
                .insert(name.to_string(), delay);
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        /// The most recent canvas handed to `encode_jpeg`.
        pub fn last_encoded(&self) -> Option<RgbImage> {
            self.last_encoded.lock().unwrap().clone()
        }

        pub fn encodes(&self) -> Vec<RecordedOp> {
            self.get_operations()
                .into_iter()
                .filter(|op| matches!(op, RecordedOp::Encode { .. }))
                .collect()
        }
    }

    impl ImageBackend for MockBackend {
        fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
            let name = file_name(path);
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(name.clone()));

            let delay = self.slow_decodes.lock().unwrap().get(&name).copied();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }

            let dims = self
                .sources
                .lock()
                .unwrap()
                .get(&name)
                .copied()
                .ok_or_else(|| BackendError::Decode(format!("No mock image for {name}")))?;
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                dims.width,
                dims.height,
                image::Rgb([128, 128, 128]),
            )))
        }

        fn encode_jpeg(
            &self,
            image: &RgbImage,
            quality: Quality,
            output: &Path,
        ) -> Result<(), BackendError> {
            let output_str = output.to_string_lossy().to_string();
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                output: output_str.clone(),
                width: image.width(),
                height: image.height(),
                quality: quality.value(),
            });
            *self.last_encoded.lock().unwrap() = Some(image.clone());

            let failing = self.failing_encodes.lock().unwrap();
            if failing.iter().any(|needle| output_str.contains(needle.as_str())) {
                // Leave a truncated file behind, as a crashed encoder would
                std::fs::write(output, b"\xFF\xD8")?;
                return Err(BackendError::Encode("mock encode failure".into()));
            }
            std::fs::write(output, b"\xFF\xD8mock\xFF\xD9")?;
            Ok(())
        }
    }

    #[test]
    fn mock_serves_listed_sources() {
        let backend = MockBackend::with_sources(&[("a.jpg", 800, 600)]);

        let img = backend.decode(Path::new("/in/a.jpg")).unwrap();
        assert_eq!((img.width(), img.height()), (800, 600));

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Decode("a.jpg".into())]);
    }

    #[test]
    fn mock_fails_unlisted_sources() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.decode(Path::new("/in/missing.jpg")),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn mock_records_encode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("x_insta.jpg");
        let backend = MockBackend::new();

        backend
            .encode_jpeg(&RgbImage::new(880, 880), Quality::new(10), &out)
            .unwrap();

        assert!(out.exists());
        assert_eq!(backend.last_encoded().unwrap().dimensions(), (880, 880));
        assert!(matches!(
            &backend.encodes()[0],
            RecordedOp::Encode {
                width: 880,
                height: 880,
                quality: 10,
                ..
            }
        ));
    }

    #[test]
    fn mock_scripted_encode_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new().fail_encode_for("bad");
        let result = backend.encode_jpeg(
            &RgbImage::new(4, 4),
            Quality::default(),
            &tmp.path().join("bad_insta.jpg"),
        );
        assert!(matches!(result, Err(BackendError::Encode(_))));
    }
}
