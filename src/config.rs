//! Batch configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. User values are
//! layered over stock defaults, then command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! template = "template/template.toml"  # Template document to composite into
//! output_base = "output"               # Run folders are created under here
//!
//! [dimensions]
//! width = 880               # Fit box, capped at the photo slot size
//! height = 880
//!
//! [output]
//! jpeg_quality = 12         # 0 (smallest) to 12 (best)
//!
//! [layers]
//! photo = "FOTO"            # Pixel layer that receives each photo
//! text = "TEXT"             # Text layer recolored per photo
//!
//! [input]
//! extensions = ["jpg", "jpeg", "png", "tif", "tiff", "gif"]
//!
//! [processing]
//! max_processes = 4         # Max decode workers (omit for auto = CPU cores)
//! queue_factor = 2          # Prefetch queue holds workers * queue_factor photos
//! item_timeout_secs = 120   # Per-photo time budget, 0 disables
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [output]
//! jpeg_quality = 8
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{MAX_QUALITY, Quality, supported_input_extensions};
use crate::template::SlotNames;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Batch configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Path to the template document.
    pub template: PathBuf,
    /// Base directory for per-run output folders.
    pub output_base: PathBuf,
    /// Fit box applied to every source photo, capped at the photo slot.
    pub dimensions: DimensionsConfig,
    /// Encoder settings.
    pub output: OutputConfig,
    /// Names of the two template slots.
    pub layers: LayersConfig,
    /// Input file filter.
    pub input: InputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("template/template.toml"),
            output_base: PathBuf::from("output"),
            dimensions: DimensionsConfig::default(),
            output: OutputConfig::default(),
            layers: LayersConfig::default(),
            input: InputConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions.width == 0 || self.dimensions.height == 0 {
            return Err(ConfigError::Validation(
                "dimensions.width and dimensions.height must be non-zero".into(),
            ));
        }
        if self.output.jpeg_quality > MAX_QUALITY {
            return Err(ConfigError::Validation(format!(
                "output.jpeg_quality must be 0-{MAX_QUALITY}"
            )));
        }
        if self.layers.photo.trim().is_empty() || self.layers.text.trim().is_empty() {
            return Err(ConfigError::Validation(
                "layers.photo and layers.text must not be empty".into(),
            ));
        }
        if self.layers.photo == self.layers.text {
            return Err(ConfigError::Validation(
                "layers.photo and layers.text must name different layers".into(),
            ));
        }
        if self.input.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "input.extensions must not be empty".into(),
            ));
        }
        let supported = supported_input_extensions();
        if let Some(ext) = self
            .input
            .extensions
            .iter()
            .find(|e| !supported.contains(&e.to_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "input.extensions: no decoder for '{ext}' (supported: {})",
                supported.join(", ")
            )));
        }
        if self.processing.queue_factor == 0 {
            return Err(ConfigError::Validation(
                "processing.queue_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output.jpeg_quality)
    }

    pub fn slot_names(&self) -> SlotNames {
        SlotNames {
            photo: self.layers.photo.clone(),
            text: self.layers.text.clone(),
        }
    }
}

/// Fit box dimensions in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DimensionsConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DimensionsConfig {
    fn default() -> Self {
        Self {
            width: 880,
            height: 880,
        }
    }
}

/// JPEG output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Quality on a 0-12 scale.
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: MAX_QUALITY,
        }
    }
}

/// Template slot names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayersConfig {
    pub photo: String,
    pub text: String,
}

impl Default for LayersConfig {
    fn default() -> Self {
        let names = SlotNames::default();
        Self {
            photo: names.photo,
            text: names.text,
        }
    }
}

/// Which files in the source folder count as inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Case-insensitive extension allow-list, without dots.
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "tif", "tiff", "gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel decode workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Prefetch queue capacity as a multiple of the worker count.
    pub queue_factor: usize,
    /// Per-photo time budget in seconds; 0 disables it.
    pub item_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            queue_factor: 2,
            item_timeout_secs: 120,
        }
    }
}

impl ProcessingConfig {
    pub fn item_timeout(&self) -> Option<Duration> {
        (self.item_timeout_secs > 0).then(|| Duration::from_secs(self.item_timeout_secs))
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Capacity of the bounded queue between the decode workers and the
/// template stage.
pub fn queue_capacity(config: &ProcessingConfig, workers: usize) -> usize {
    workers.max(1) * config.queue_factor.max(1)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BatchConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BatchConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BatchConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<BatchConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Instaframe Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# Template document every photo is composited into.
template = "template/template.toml"

# Each run creates output_YYYYMMDD_HHMMSS/ under this directory.
output_base = "output"

# ---------------------------------------------------------------------------
# Fit box
# ---------------------------------------------------------------------------
[dimensions]
# Every photo is scaled (up or down) to the largest size that fits this box
# while keeping its aspect ratio, then centered in the photo slot. A box
# larger than the photo slot is reduced to the slot's size.
width = 880
height = 880

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# JPEG quality from 0 (smallest files) to 12 (best quality).
jpeg_quality = 12

# ---------------------------------------------------------------------------
# Template slots
# ---------------------------------------------------------------------------
[layers]
# Pixel layer that receives each photo.
photo = "FOTO"
# Text layer whose color is randomized for every photo.
text = "TEXT"

# ---------------------------------------------------------------------------
# Input files
# ---------------------------------------------------------------------------
[input]
# Extensions picked up from the source folder (case-insensitive).
extensions = ["jpg", "jpeg", "png", "tif", "tiff", "gif"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel decode workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Decoded photos waiting for the template are capped at
# workers * queue_factor.
queue_factor = 2

# Seconds a single photo may spend loading or writing before it is
# recorded as timed out. 0 disables the limit.
item_timeout_secs = 120
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = BatchConfig::default();
        assert_eq!(config.template, PathBuf::from("template/template.toml"));
        assert_eq!(config.output_base, PathBuf::from("output"));
        assert_eq!((config.dimensions.width, config.dimensions.height), (880, 880));
        assert_eq!(config.output.jpeg_quality, 12);
        assert_eq!(config.layers.photo, "FOTO");
        assert_eq!(config.layers.text, "TEXT");
        assert_eq!(config.input.extensions.len(), 6);
        assert_eq!(config.processing.queue_factor, 2);
        assert_eq!(
            config.processing.item_timeout(),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[output]
jpeg_quality = 8
"#;
        let config: BatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output.jpeg_quality, 8);
        assert_eq!(config.dimensions.width, 880);
        assert_eq!(config.layers.photo, "FOTO");
    }

    #[test]
    fn slot_names_follow_layers() {
        let toml = r#"
[layers]
photo = "Picture"
text = "Caption"
"#;
        let config: BatchConfig = toml::from_str(toml).unwrap();
        let names = config.slot_names();
        assert_eq!(names.photo, "Picture");
        assert_eq!(names.text, "Caption");
    }

    #[test]
    fn zero_timeout_disables_budget() {
        let config = ProcessingConfig {
            item_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.item_timeout(), None);
    }

    // =========================================================================
    // effective_threads / queue_capacity
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let threads = effective_threads(&ProcessingConfig::default());
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
            ..Default::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..Default::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_never_zero() {
        let config = ProcessingConfig {
            max_processes: Some(0),
            ..Default::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn queue_capacity_is_multiple_of_workers() {
        let config = ProcessingConfig {
            queue_factor: 3,
            ..Default::default()
        };
        assert_eq!(queue_capacity(&config, 4), 12);
        assert_eq!(queue_capacity(&config, 0), 3);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        BatchConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_quality_boundary_ok() {
        let mut config = BatchConfig::default();
        config.output.jpeg_quality = 12;
        assert!(config.validate().is_ok());
        config.output.jpeg_quality = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_quality_too_high() {
        let mut config = BatchConfig::default();
        config.output.jpeg_quality = 13;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_dimension() {
        let mut config = BatchConfig::default();
        config.dimensions.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_same_layer_names() {
        let mut config = BatchConfig::default();
        config.layers.text = "FOTO".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_empty_layer_name() {
        let mut config = BatchConfig::default();
        config.layers.photo = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_empty_extensions() {
        let mut config = BatchConfig::default();
        config.input.extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_extension_without_decoder() {
        let mut config = BatchConfig::default();
        config.input.extensions.push("heic".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("heic"));
    }

    #[test]
    fn validate_extension_case_insensitive() {
        let mut config = BatchConfig::default();
        config.input.extensions = vec!["JPG".into(), "Png".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_zero_queue_factor() {
        let mut config = BatchConfig::default();
        config.processing.queue_factor = 0;
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.output.jpeg_quality, 12);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
template = "my/template.toml"

[dimensions]
width = 1080

[processing]
max_processes = 2
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.template, PathBuf::from("my/template.toml"));
        assert_eq!(config.dimensions.width, 1080);
        // Sibling key preserved through the merge
        assert_eq!(config.dimensions.height, 880);
        assert_eq!(config.processing.max_processes, Some(2));
        assert_eq!(config.processing.queue_factor, 2);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not [valid toml").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[output]\njpeg_quality = 50\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[output]\nquality = 5\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let toml = r##"
[colors]
text = "#000"
"##;
        let result: Result<BatchConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("jpeg_quality = 12").unwrap();
        let overlay: toml::Value = toml::from_str("jpeg_quality = 6").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("jpeg_quality").unwrap().as_integer(), Some(6));
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base: toml::Value = toml::from_str(
            r#"
[dimensions]
width = 880
height = 880
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str("[dimensions]\nwidth = 1080\n").unwrap();
        let merged = merge_toml(base, overlay);
        let dims = merged.get("dimensions").unwrap();
        assert_eq!(dims.get("width").unwrap().as_integer(), Some(1080));
        assert_eq!(dims.get("height").unwrap().as_integer(), Some(880));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str(r#"extensions = ["jpg", "png"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"extensions = ["gif"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("extensions").unwrap().as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: BatchConfig = toml::from_str(stock_config_toml()).unwrap();
        config.validate().unwrap();
        let defaults = BatchConfig::default();
        assert_eq!(config.template, defaults.template);
        assert_eq!(config.output_base, defaults.output_base);
        assert_eq!(config.output.jpeg_quality, defaults.output.jpeg_quality);
        assert_eq!(config.input.extensions, defaults.input.extensions);
        assert_eq!(config.processing.max_processes, None);
        assert_eq!(config.processing.item_timeout_secs, 120);
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[dimensions]", "[output]", "[layers]", "[input]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        for key in ["template", "output_base", "dimensions", "output", "layers", "input", "processing"] {
            assert!(val.get(key).is_some(), "missing {key}");
        }
    }
}
