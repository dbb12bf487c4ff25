//! # Instaframe
//!
//! Batch-composite photos into a fixed social media template. Every photo in a
//! folder is scaled to fit, centered in the template's photo slot, given a
//! freshly randomized caption color, and exported as `{name}_insta.jpg` into
//! a timestamped output folder.
//!
//! # Architecture: Two-Stage Pipeline
//!
//! ```text
//! 1. Prepare   (parallel)    decode → fit                    per photo, no shared state
//! 2. Composite (serialized)  place → recolor → encode/write  one template, one photo at a time
//! ```
//!
//! The template is one long-lived in-memory canvas. It is opened once, mutated
//! in place for each photo, and closed (never saved) at the end. Because the
//! photo and caption slots are overwritten in place, only one thread may touch
//! it: stage 1 runs on a rayon pool and hands fitted rasters through a bounded
//! queue to stage 2, which runs on the calling thread.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Fit/center math, codec backend trait, asset loading and fitting |
//! | [`template`] | Template file format and the [`template::TemplateSession`] canvas |
//! | [`compose`] | Per-photo mutations: centered placement, random caption color |
//! | [`export`] | Output folder creation and atomic JPEG writes |
//! | [`process`] | Batch runner: stages, queue, cancellation, timeouts, events |
//! | [`scan`] | Non-recursive input enumeration by extension |
//! | [`config`] | `config.toml` loading, validation, merging |
//! | [`naming`] | Output file and folder naming |
//! | [`types`] | Batch report types, serializable to JSON |
//! | [`output`] | CLI output formatting: progress bar, events, final report |
//!
//! # Design Decisions
//!
//! ## Upscaling Small Photos
//!
//! The fit ratio is `min(targetW / srcW, targetH / srcH)` with no clamp at 1.0,
//! so a 400×400 photo fills an 800×800 box. Every output has the same visual
//! weight regardless of source resolution.
//!
//! ## Failures Are Data
//!
//! A photo that cannot be read, encoded, or written is recorded in the
//! [`types::BatchReport`] and the batch continues. Only a malformed template
//! (missing or wrong-typed slot) stops the run, because every later photo would
//! fail the same way.
//!
//! ## No Partial Outputs
//!
//! JPEGs are encoded to a hidden temporary file and renamed into place, so a
//! failed item never leaves a truncated file behind.
//!
//! ## Injected Randomness and Time
//!
//! The caption color source is any [`rand::Rng`] and the folder timestamp
//! comes from an [`export::Clock`], so tests pin both.

pub mod compose;
pub mod config;
pub mod export;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
