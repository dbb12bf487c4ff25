//! Shared result types of a batch run.
//!
//! These are serialized to JSON when the CLI is asked for a report file, so
//! they stay plain data: no paths into live resources, no timers.

use crate::imaging::OverlayColor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Mutation counters of a template session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Photo slot replacements performed.
    pub replacements: u32,
    /// Text slot recolors performed.
    pub recolors: u32,
}

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed { reason: String },
}

/// One input file's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Source file name (no directory).
    pub filename: String,
    #[serde(flatten)]
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Caption color used for this output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<OverlayColor>,
}

impl BatchItem {
    pub fn success(filename: String, output_path: PathBuf, color: OverlayColor) -> Self {
        Self {
            filename,
            status: ItemStatus::Success,
            output_path: Some(output_path),
            color: Some(color),
        }
    }

    pub fn failed(filename: String, reason: impl Into<String>) -> Self {
        Self {
            filename,
            status: ItemStatus::Failed {
                reason: reason.into(),
            },
            output_path: None,
            color: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }

    /// Failure reason, if the item failed.
    pub fn reason(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Failed { reason } => Some(reason),
            ItemStatus::Success => None,
        }
    }
}

/// Aggregate outcome of one full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub output_folder: PathBuf,
    /// Number of input files enumerated.
    pub total: usize,
    /// Items in the order the serialized stage finished them.
    pub items: Vec<BatchItem>,
    /// Inputs never reached because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub session: SessionStats,
}

impl BatchReport {
    pub fn new(output_folder: PathBuf, total: usize) -> Self {
        Self {
            output_folder,
            total,
            items: Vec::with_capacity(total),
            skipped: 0,
            cancelled: false,
            elapsed_ms: 0,
            session: SessionStats::default(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|i| !i.is_success())
    }

    /// Number of items processed so far (succeeded or failed).
    pub fn processed(&self) -> usize {
        self.items.len()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}
