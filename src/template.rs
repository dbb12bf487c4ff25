//! Template documents and the long-lived template session.
//!
//! A template is a fixed-size canvas with a stack of named layers. Exactly two
//! of them matter to the pipeline: the **photo slot** (a pixel layer that holds
//! at most one occupant raster) and the **text slot** (a caption whose fill
//! color changes per image). Any other layers are static decoration.
//!
//! ## Template File
//!
//! ```toml
//! [canvas]
//! width = 880
//! height = 880
//! background = "#ffffff"         # solid fill under everything
//! background_image = "bg.png"    # optional, resized to the canvas
//!
//! [[layers]]                     # listed bottom-most first
//! name = "FOTO"
//! kind = "pixel"
//! bounds = [40, 40, 840, 840]    # left, top, right, bottom
//! source = "placeholder.png"     # optional initial occupant
//!
//! [[layers]]
//! name = "TEXT"
//! kind = "text"
//! bounds = [40, 760, 840, 840]
//! mask = "caption.png"           # coverage mask; omit for a solid block
//! color = "#000000"
//! ```
//!
//! Relative paths resolve against the template file's directory.
//!
//! ## Session Lifecycle
//!
//! ```text
//! open() ──► Pristine ──replace/recolor──► Active ──close()──► Closed
//! ```
//!
//! The session is opened once per batch and mutated in place for every image.
//! Both slots are fully overwritten on each pass, so nothing drifts between
//! iterations. The template file is never written back.

use crate::imaging::{FittedAsset, OverlayColor, Placement, SlotBounds};
use crate::types::SessionStats;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template file not found: {0}")]
    NotFound(PathBuf),
    #[error("Template {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Photo slot '{0}' not found in template")]
    PhotoSlotMissing(String),
    #[error("Layer '{0}' is not a pixel layer")]
    NotAPhotoSlot(String),
    #[error("Text slot '{0}' not found in template")]
    TextSlotMissing(String),
    #[error("Layer '{0}' is not a text layer")]
    NotATextSlot(String),
    #[error("Template session is closed")]
    SessionClosed,
}

impl TemplateError {
    /// Malformed-template errors: every later image would fail identically.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TemplateError::PhotoSlotMissing(_)
                | TemplateError::NotAPhotoSlot(_)
                | TemplateError::TextSlotMissing(_)
                | TemplateError::NotATextSlot(_)
        )
    }
}

// ============================================================================
// Template document (on-disk format)
// ============================================================================

/// Parsed template file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDocument {
    pub canvas: CanvasSpec,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: OverlayColor,
    #[serde(default)]
    pub background_image: Option<PathBuf>,
}

fn default_background() -> OverlayColor {
    OverlayColor::WHITE
}

/// Unknown keys inside a `[[layers]]` entry are rejected like everywhere else.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum LayerSpec {
    Pixel {
        name: String,
        bounds: [i64; 4],
        #[serde(default)]
        source: Option<PathBuf>,
    },
    Text {
        name: String,
        bounds: [i64; 4],
        #[serde(default)]
        mask: Option<PathBuf>,
        #[serde(default)]
        color: OverlayColor,
    },
}

impl LayerSpec {
    fn name(&self) -> &str {
        match self {
            LayerSpec::Pixel { name, .. } | LayerSpec::Text { name, .. } => name,
        }
    }

    fn bounds(&self) -> SlotBounds {
        let [l, t, r, b] = match self {
            LayerSpec::Pixel { bounds, .. } | LayerSpec::Text { bounds, .. } => *bounds,
        };
        SlotBounds::new(l, t, r, b)
    }
}

/// Names of the two slots the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNames {
    pub photo: String,
    pub text: String,
}

impl Default for SlotNames {
    fn default() -> Self {
        Self {
            photo: "FOTO".to_string(),
            text: "TEXT".to_string(),
        }
    }
}

// ============================================================================
// In-memory layers
// ============================================================================

/// The raster currently held by the photo slot.
#[derive(Debug, Clone)]
pub struct Occupant {
    /// File the raster came from.
    pub source: Option<PathBuf>,
    pub placement: Placement,
    pub raster: RgbaImage,
}

#[derive(Debug)]
struct PixelLayer {
    name: String,
    bounds: SlotBounds,
    occupant: Option<Occupant>,
}

#[derive(Debug)]
struct TextLayer {
    name: String,
    bounds: SlotBounds,
    /// Per-pixel coverage of the caption artwork, sized to `bounds`.
    coverage: GrayImage,
    color: OverlayColor,
}

impl TextLayer {
    fn render(&self) -> RgbaImage {
        let OverlayColor { red, green, blue } = self.color;
        RgbaImage::from_fn(self.coverage.width(), self.coverage.height(), |x, y| {
            Rgba([red, green, blue, self.coverage.get_pixel(x, y)[0]])
        })
    }
}

#[derive(Debug)]
enum Layer {
    Pixel(PixelLayer),
    Text(TextLayer),
}

impl Layer {
    fn name(&self) -> &str {
        match self {
            Layer::Pixel(p) => &p.name,
            Layer::Text(t) => &t.name,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pristine,
    Active,
    Closed,
}

/// The one shared, mutable canvas of a batch run.
///
/// Not `Clone`: there is exactly one session per run, mutated only by the
/// serialized stage.
#[derive(Debug)]
pub struct TemplateSession {
    path: PathBuf,
    width: u32,
    height: u32,
    background: RgbaImage,
    layers: Vec<Layer>,
    photo_layer: usize,
    text_slot: String,
    state: SessionState,
    stats: SessionStats,
}

impl TemplateSession {
    /// Open and validate a template file.
    ///
    /// The photo slot is resolved here; the text slot is checked on first use
    /// by [`set_text_color`](Self::set_text_color).
    pub fn open(path: &Path, slots: &SlotNames) -> Result<Self, TemplateError> {
        if !path.is_file() {
            return Err(TemplateError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| corrupt(path, e))?;
        let document: TemplateDocument = toml::from_str(&content).map_err(|e| corrupt(path, e))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_document(document, base_dir, path, slots)
    }

    /// Build a session from an already-parsed document.
    ///
    /// `base_dir` anchors relative image paths; `path` is used for messages.
    pub fn from_document(
        document: TemplateDocument,
        base_dir: &Path,
        path: &Path,
        slots: &SlotNames,
    ) -> Result<Self, TemplateError> {
        let TemplateDocument { canvas, layers } = document;
        if canvas.width == 0 || canvas.height == 0 {
            return Err(corrupt(path, "canvas dimensions must be non-zero"));
        }
        let canvas_bounds = SlotBounds::full(canvas.width, canvas.height);

        let OverlayColor { red, green, blue } = canvas.background;
        let mut background =
            RgbaImage::from_pixel(canvas.width, canvas.height, Rgba([red, green, blue, 255]));
        if let Some(rel) = &canvas.background_image {
            let img = load_asset(path, &base_dir.join(rel))?;
            let img = img.resize_exact(canvas.width, canvas.height, FilterType::Lanczos3);
            imageops::overlay(&mut background, &img.into_rgba8(), 0, 0);
        }

        let mut built: Vec<Layer> = Vec::with_capacity(layers.len());
        for spec in &layers {
            let name = spec.name();
            if name.is_empty() {
                return Err(corrupt(path, "layer names must not be empty"));
            }
            if built.iter().any(|l| l.name() == name) {
                return Err(corrupt(path, format!("duplicate layer name '{name}'")));
            }
            let bounds = spec.bounds();
            if bounds.is_empty() || !within(bounds, canvas_bounds) {
                return Err(corrupt(
                    path,
                    format!("layer '{name}' bounds must be a non-empty region inside the canvas"),
                ));
            }
            let (w, h) = (bounds.width() as u32, bounds.height() as u32);

            let layer = match spec {
                LayerSpec::Pixel { source, .. } => {
                    let occupant = match source {
                        Some(rel) => {
                            let full = base_dir.join(rel);
                            let img = load_asset(path, &full)?;
                            Some(Occupant {
                                source: Some(full),
                                placement: Placement {
                                    x: bounds.left,
                                    y: bounds.top,
                                },
                                raster: img.resize_exact(w, h, FilterType::Lanczos3).into_rgba8(),
                            })
                        }
                        None => None,
                    };
                    Layer::Pixel(PixelLayer {
                        name: name.to_string(),
                        bounds,
                        occupant,
                    })
                }
                LayerSpec::Text { mask, color, .. } => {
                    let coverage = match mask {
                        Some(rel) => {
                            let img = load_asset(path, &base_dir.join(rel))?;
                            let coverage = mask_coverage(&img);
                            if coverage.dimensions() == (w, h) {
                                coverage
                            } else {
                                imageops::resize(&coverage, w, h, FilterType::Triangle)
                            }
                        }
                        None => GrayImage::from_pixel(w, h, Luma([255])),
                    };
                    Layer::Text(TextLayer {
                        name: name.to_string(),
                        bounds,
                        coverage,
                        color: *color,
                    })
                }
            };
            built.push(layer);
        }

        let photo_layer = built
            .iter()
            .position(|l| l.name() == slots.photo)
            .ok_or_else(|| TemplateError::PhotoSlotMissing(slots.photo.clone()))?;
        if !matches!(built[photo_layer], Layer::Pixel(_)) {
            return Err(TemplateError::NotAPhotoSlot(slots.photo.clone()));
        }

        info!(template = %path.display(), width = canvas.width, height = canvas.height, layers = built.len(), "Opened template");
        Ok(Self {
            path: path.to_path_buf(),
            width: canvas.width,
            height: canvas.height,
            background,
            layers: built,
            photo_layer,
            text_slot: slots.text.clone(),
            state: SessionState::Pristine,
            stats: SessionStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Canvas size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Region of the canvas reserved for the photo.
    pub fn photo_bounds(&self) -> SlotBounds {
        self.photo().bounds
    }

    /// The photo slot's current occupant, if any.
    pub fn occupant(&self) -> Option<&Occupant> {
        self.photo().occupant.as_ref()
    }

    /// Current fill color of the text slot.
    pub fn text_color(&self) -> Result<OverlayColor, TemplateError> {
        Ok(self.text_layer()?.color)
    }

    /// Swap the photo slot's occupant for `fitted`, positioned at `placement`.
    ///
    /// Any previous occupant is dropped first, so after N calls the slot holds
    /// exactly the Nth raster.
    pub fn replace_photo_slot(
        &mut self,
        fitted: FittedAsset,
        placement: Placement,
    ) -> Result<(), TemplateError> {
        self.ensure_open()?;
        let index = self.photo_layer;
        let Layer::Pixel(slot) = &mut self.layers[index] else {
            unreachable!("photo slot kind is checked on open");
        };
        if let Some(previous) = slot.occupant.take() {
            debug!(slot = %slot.name, previous = ?previous.source, "Removed existing occupant");
        }
        debug!(
            slot = %slot.name,
            source = %fitted.path.display(),
            width = fitted.width,
            height = fitted.height,
            x = placement.x,
            y = placement.y,
            "Placed new occupant"
        );
        slot.occupant = Some(Occupant {
            source: Some(fitted.path),
            placement,
            raster: fitted.raster,
        });
        self.stats.replacements += 1;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Set the text slot's fill color.
    ///
    /// Fails with [`TemplateError::TextSlotMissing`] or
    /// [`TemplateError::NotATextSlot`] on a malformed template.
    pub fn set_text_color(&mut self, color: OverlayColor) -> Result<(), TemplateError> {
        self.ensure_open()?;
        let layer = self.text_layer_mut()?;
        layer.color = color;
        debug!(slot = %layer.name, "Text color changed to {color}");
        self.stats.recolors += 1;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Flatten the current canvas state for encoding.
    pub fn snapshot_for_export(&self) -> Result<RgbImage, TemplateError> {
        self.ensure_open()?;
        let mut canvas = self.background.clone();
        for layer in &self.layers {
            match layer {
                Layer::Pixel(pixel) => {
                    if let Some(occ) = &pixel.occupant {
                        imageops::overlay(&mut canvas, &occ.raster, occ.placement.x, occ.placement.y);
                    }
                }
                Layer::Text(text) => {
                    imageops::overlay(&mut canvas, &text.render(), text.bounds.left, text.bounds.top);
                }
            }
        }
        Ok(DynamicImage::ImageRgba8(canvas).into_rgb8())
    }

    /// Release all rasters and discard in-memory edits.
    ///
    /// Closing twice is an error so the single close of a run stays observable.
    pub fn close(&mut self) -> Result<SessionStats, TemplateError> {
        self.ensure_open()?;
        for layer in &mut self.layers {
            if let Layer::Pixel(pixel) = layer {
                pixel.occupant = None;
            }
        }
        self.background = RgbaImage::new(0, 0);
        self.state = SessionState::Closed;
        info!(template = %self.path.display(), replacements = self.stats.replacements, "Template closed without saving");
        Ok(self.stats)
    }

    fn ensure_open(&self) -> Result<(), TemplateError> {
        if self.state == SessionState::Closed {
            return Err(TemplateError::SessionClosed);
        }
        Ok(())
    }

    fn photo(&self) -> &PixelLayer {
        match &self.layers[self.photo_layer] {
            Layer::Pixel(p) => p,
            Layer::Text(_) => unreachable!("photo slot kind is checked on open"),
        }
    }

    fn text_layer(&self) -> Result<&TextLayer, TemplateError> {
        match self.layers.iter().find(|l| l.name() == self.text_slot) {
            Some(Layer::Text(t)) => Ok(t),
            Some(Layer::Pixel(_)) => Err(TemplateError::NotATextSlot(self.text_slot.clone())),
            None => Err(TemplateError::TextSlotMissing(self.text_slot.clone())),
        }
    }

    fn text_layer_mut(&mut self) -> Result<&mut TextLayer, TemplateError> {
        let slot = &self.text_slot;
        match self.layers.iter_mut().find(|l| l.name() == slot) {
            Some(Layer::Text(t)) => Ok(t),
            Some(Layer::Pixel(_)) => Err(TemplateError::NotATextSlot(slot.clone())),
            None => Err(TemplateError::TextSlotMissing(slot.clone())),
        }
    }
}

impl Drop for TemplateSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(template = %self.path.display(), "Template session dropped without close");
        }
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> TemplateError {
    TemplateError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn load_asset(template: &Path, asset: &Path) -> Result<DynamicImage, TemplateError> {
    image::open(asset).map_err(|e| corrupt(template, format!("{}: {}", asset.display(), e)))
}

fn within(inner: SlotBounds, outer: SlotBounds) -> bool {
    inner.left >= outer.left
        && inner.top >= outer.top
        && inner.right <= outer.right
        && inner.bottom <= outer.bottom
}

/// Coverage = luminance × alpha, so both white-on-transparent and
/// white-on-black masks work.
fn mask_coverage(img: &DynamicImage) -> GrayImage {
    let la = img.to_luma_alpha8();
    GrayImage::from_fn(la.width(), la.height(), |x, y| {
        let p = la.get_pixel(x, y);
        Luma([((p[0] as u16 * p[1] as u16) / 255) as u8])
    })
}
