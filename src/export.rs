//! Encoding the current template state and persisting it.
//!
//! ## Atomic Writes
//!
//! Every output is encoded into a hidden `.{name}.partial` file beside its
//! final location, then renamed into place. A failed or timed-out encode
//! removes the partial file, so the output folder only ever contains complete
//! JPEGs. An existing file with the same name is overwritten silently.
//!
//! ## Output Folder
//!
//! The folder name comes from a [`Clock`] read once at run start, so tests can
//! pin the timestamp with [`FixedClock`].

use crate::imaging::{BackendError, ImageBackend, Quality};
use crate::naming::{output_file_name, output_folder_name};
use crate::template::{TemplateError, TemplateSession};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Output folder already exists: {0}")]
    FolderExists(PathBuf),
    #[error("Cannot create output folder {path}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Write exceeded the {budget:?} item timeout")]
    Timeout { budget: Duration },
}

/// Source of the current wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Create this run's `output_YYYYMMDD_HHMMSS` folder under `base`.
///
/// The base is created if needed; the run folder itself must not exist yet.
pub fn create_output_folder(base: &Path, clock: &dyn Clock) -> Result<PathBuf, ExportError> {
    let folder = base.join(output_folder_name(clock.now()));
    std::fs::create_dir_all(base).map_err(|source| ExportError::CreateFolder {
        path: base.to_path_buf(),
        source,
    })?;
    match std::fs::create_dir(&folder) {
        Ok(()) => Ok(folder),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(ExportError::FolderExists(folder))
        }
        Err(source) => Err(ExportError::CreateFolder {
            path: folder,
            source,
        }),
    }
}

/// Encode the session's current canvas as `{stem}_insta.jpg` in `folder`.
///
/// `deadline` bounds the encode: an encode that finishes after it is
/// discarded and reported as [`ExportError::Timeout`].
pub fn write(
    backend: &impl ImageBackend,
    session: &TemplateSession,
    folder: &Path,
    source: &Path,
    quality: Quality,
    deadline: Option<(Instant, Duration)>,
) -> Result<PathBuf, ExportError> {
    let name = output_file_name(source);
    let final_path = folder.join(&name);
    let partial_path = folder.join(format!(".{name}.partial"));

    let canvas = session.snapshot_for_export()?;
    if let Err(e) = backend.encode_jpeg(&canvas, quality, &partial_path) {
        discard(&partial_path);
        return Err(match e {
            BackendError::Io(source) => ExportError::Write {
                path: final_path,
                source,
            },
            other => ExportError::Encode(other.to_string()),
        });
    }

    if let Some((deadline, budget)) = deadline {
        if Instant::now() > deadline {
            discard(&partial_path);
            return Err(ExportError::Timeout { budget });
        }
    }

    std::fs::rename(&partial_path, &final_path).map_err(|source| {
        discard(&partial_path);
        ExportError::Write {
            path: final_path.clone(),
            source,
        }
    })?;
    debug!(output = %final_path.display(), "Saved");
    Ok(final_path)
}

fn discard(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Could not remove partial output"),
    }
}
