//! Batch orchestration: many photos, one template.
//!
//! ## Pipeline
//!
//! ```text
//!            parallel (rayon pool)                 serialized (calling thread)
//! inputs ──► load ─► fit ──► [bounded queue] ──► compose ─► recolor ─► write
//! ```
//!
//! Decoding and resampling are independent per file, so they run on a local
//! rayon pool sized from `[processing] max_processes`. The template session is
//! a single mutable canvas: only the calling thread ever touches it, taking
//! one fitted photo at a time off a `sync_channel`. The channel's capacity
//! (workers × `queue_factor`) is the backpressure: when the template stage
//! falls behind, workers block on send instead of buffering decoded rasters.
//!
//! ## Failure Handling
//!
//! Each photo yields a `Result`. Per-item errors (unreadable file, encode or
//! write failure, timeout) are recorded in the [`BatchReport`] and the batch
//! moves on. Template-structure errors are fatal: every later photo would fail
//! the same way, so the run stops. On every path the template session is
//! closed exactly once before control returns.
//!
//! ## States
//!
//! ```text
//! Idle ─► TemplateOpen ─► Running ─► Draining ─► Done
//!              │             │
//!              └──► Failed ◄─┘   (template unopenable, no inputs, fatal item)
//! ```

use crate::compose::{compose, recolor};
use crate::config::{BatchConfig, effective_threads, queue_capacity};
use crate::export::{self, Clock, ExportError, SystemClock, create_output_folder};
use crate::imaging::{
    FitError, FittedAsset, ImageBackend, LoadError, OverlayColor, PrepareError, Quality,
    RustBackend, SlotBounds, prepare,
};
use crate::scan::{ScanError, enumerate_inputs};
use crate::template::{SlotNames, TemplateError, TemplateSession};
use crate::types::{BatchItem, BatchReport, SessionStats};
use rand::Rng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, sync_channel};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot open template: {0}")]
    Template(#[source] TemplateError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("No supported images found in {0}")]
    NoInputs(PathBuf),
    #[error(transparent)]
    OutputFolder(#[from] ExportError),
    #[error("Cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Batch aborted at {filename}: {source}")]
    Fatal {
        filename: String,
        #[source]
        source: ItemError,
    },
}

/// Why a single photo failed.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Export(ExportError),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<PrepareError> for ItemError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Load(e) => ItemError::Load(e),
            PrepareError::Fit(e) => ItemError::Fit(e),
        }
    }
}

impl From<ExportError> for ItemError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Timeout { budget } => ItemError::Timeout(budget),
            ExportError::Template(e) => ItemError::Template(e),
            other => ItemError::Export(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Every remaining item would fail the same way; stop the batch.
    Fatal,
    /// Record and continue.
    PerItem,
}

impl ItemError {
    pub fn severity(&self) -> Severity {
        match self {
            ItemError::Template(e) if e.is_structural() => Severity::Fatal,
            ItemError::Template(TemplateError::SessionClosed) => Severity::Fatal,
            _ => Severity::PerItem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    TemplateOpen,
    Running,
    Draining,
    Done,
    Failed,
}

/// Progress notifications for whatever presentation layer is attached.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        total: usize,
        output_folder: PathBuf,
    },
    Progress {
        current: usize,
        total: usize,
    },
    Success {
        filename: String,
        output_path: PathBuf,
        color: OverlayColor,
    },
    Error {
        filename: String,
        reason: String,
    },
    Complete {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
        elapsed: Duration,
    },
}

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolved run parameters.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub template: PathBuf,
    pub output_base: PathBuf,
    pub slots: SlotNames,
    pub target_width: u32,
    pub target_height: u32,
    pub quality: Quality,
    pub extensions: Vec<String>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub item_timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        let workers = effective_threads(&config.processing);
        Self {
            template: config.template.clone(),
            output_base: config.output_base.clone(),
            slots: config.slot_names(),
            target_width: config.dimensions.width,
            target_height: config.dimensions.height,
            quality: config.quality(),
            extensions: config.input.extensions.clone(),
            workers,
            queue_capacity: queue_capacity(&config.processing, workers),
            item_timeout: config.processing.item_timeout(),
        }
    }
}

/// A fitted photo (or its failure) handed from the workers to the template
/// stage.
struct Prefetched {
    index: usize,
    path: PathBuf,
    result: Result<FittedAsset, ItemError>,
}

/// The template stage's end of the hand-off from the workers.
struct Intake<'s> {
    rx: Receiver<Prefetched>,
    /// When a worker picked up each input, by index.
    started: &'s [OnceLock<Instant>],
}

/// Run a batch with the `image` crate backend, system time and thread RNG.
pub fn run_batch(
    source_dir: &Path,
    config: &BatchConfig,
    events: Option<Sender<BatchEvent>>,
    cancel: CancelToken,
) -> Result<BatchReport, BatchError> {
    let backend = RustBackend::new();
    let mut runner = BatchRunner::new(&backend, BatchOptions::from_config(config))
        .with_cancel(cancel);
    if let Some(tx) = events {
        runner = runner.with_events(tx);
    }
    runner.run(source_dir, &mut rand::rng())
}

/// Drives one batch through the pipeline.
pub struct BatchRunner<'a, B: ImageBackend> {
    backend: &'a B,
    options: BatchOptions,
    clock: Box<dyn Clock>,
    events: Option<Sender<BatchEvent>>,
    cancel: CancelToken,
    state: BatchState,
}

impl<'a, B: ImageBackend> BatchRunner<'a, B> {
    pub fn new(backend: &'a B, options: BatchOptions) -> Self {
        Self {
            backend,
            options,
            clock: Box::new(SystemClock),
            events: None,
            cancel: CancelToken::new(),
            state: BatchState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_events(mut self, tx: Sender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Open the template, process every input in `source_dir`, close the
    /// template.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        source_dir: &Path,
        rng: &mut R,
    ) -> Result<BatchReport, BatchError> {
        self.transition(BatchState::TemplateOpen);
        let mut session = match TemplateSession::open(&self.options.template, &self.options.slots)
        {
            Ok(session) => session,
            Err(e) => {
                self.transition(BatchState::Failed);
                return Err(BatchError::Template(e));
            }
        };
        self.run_with_session(&mut session, source_dir, rng)
    }

    /// Process every input against an already open session.
    ///
    /// The session is closed before this returns, whatever the outcome.
    pub fn run_with_session<R: Rng + ?Sized>(
        &mut self,
        session: &mut TemplateSession,
        source_dir: &Path,
        rng: &mut R,
    ) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        if self.state == BatchState::Idle {
            self.transition(BatchState::TemplateOpen);
        }

        let (inputs, folder) = match self.prepare_run(source_dir) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.close(session);
                self.transition(BatchState::Failed);
                return Err(e);
            }
        };

        self.transition(BatchState::Running);
        info!(
            total = inputs.len(),
            folder = %folder.display(),
            "Processing started"
        );
        self.emit(BatchEvent::Started {
            total: inputs.len(),
            output_folder: folder.clone(),
        });

        let mut report = BatchReport::new(folder.clone(), inputs.len());
        let outcome = self.run_stages(session, &inputs, &folder, rng, &mut report);

        self.transition(BatchState::Draining);
        report.session = self.close(session);
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Err(e) = outcome {
            self.transition(BatchState::Failed);
            return Err(e);
        }

        self.transition(BatchState::Done);
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped,
            "Processing complete"
        );
        self.emit(BatchEvent::Complete {
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped,
            cancelled: report.cancelled,
            elapsed: report.elapsed(),
        });
        Ok(report)
    }

    fn prepare_run(&self, source_dir: &Path) -> Result<(Vec<PathBuf>, PathBuf), BatchError> {
        let inputs = enumerate_inputs(source_dir, &self.options.extensions)?;
        if inputs.is_empty() {
            return Err(BatchError::NoInputs(source_dir.to_path_buf()));
        }
        let folder = create_output_folder(&self.options.output_base, self.clock.as_ref())?;
        Ok((inputs, folder))
    }

    /// The fitter's target box: the configured dimensions, shrunk to the
    /// photo slot so a fitted photo never covers the template's frame.
    fn fit_box(&self, slot: SlotBounds) -> (u32, u32) {
        let limit = |configured: u32, slot_len: i64| {
            u32::try_from(slot_len).map_or(configured, |len| configured.min(len.max(1)))
        };
        (
            limit(self.options.target_width, slot.width()),
            limit(self.options.target_height, slot.height()),
        )
    }

    fn run_stages<R: Rng + ?Sized>(
        &self,
        session: &mut TemplateSession,
        inputs: &[PathBuf],
        folder: &Path,
        rng: &mut R,
        report: &mut BatchReport,
    ) -> Result<(), BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()?;
        let (tx, rx) = sync_channel(self.options.queue_capacity.max(1));
        let stop = AtomicBool::new(false);
        let started: Vec<OnceLock<Instant>> = inputs.iter().map(|_| OnceLock::new()).collect();

        let backend = self.backend;
        let cancel = self.cancel.clone();
        let (target_w, target_h) = self.fit_box(session.photo_bounds());
        debug!(width = target_w, height = target_h, "Fit box");
        let budget = self.options.item_timeout;
        let stop_ref = &stop;
        let started_ref = &started;

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    inputs
                        .par_iter()
                        .enumerate()
                        .for_each_with(tx, |tx, (index, path)| {
                            if cancel.is_cancelled() || stop_ref.load(Ordering::SeqCst) {
                                return;
                            }
                            let started_at = Instant::now();
                            started_ref[index].set(started_at).ok();
                            let result = prepare(backend, path, target_w, target_h)
                                .map_err(ItemError::from)
                                .and_then(|fitted| match budget {
                                    Some(b) if started_at.elapsed() > b => {
                                        Err(ItemError::Timeout(b))
                                    }
                                    _ => Ok(fitted),
                                });
                            // A closed receiver means the template stage has stopped.
                            tx.send(Prefetched {
                                index,
                                path: path.clone(),
                                result,
                            })
                            .ok();
                        });
                });
            });

            let intake = Intake {
                rx,
                started: &started,
            };
            let outcome = self.serialized_stage(intake, session, inputs, folder, rng, report);
            stop.store(true, Ordering::SeqCst);
            outcome
        })
    }

    /// Apply fitted photos to the template one at a time.
    ///
    /// When nothing arrives for two timeout windows, every item a worker has
    /// held for longer than the budget is recorded as timed out and the stage
    /// keeps waiting for the rest. If no worker is busy with anything else, the
    /// workers are stuck and the stage stops; photos never picked up are
    /// counted as skipped. A result that arrives after its item timed out is
    /// discarded.
    ///
    /// Consumes the receiver so that, on return, workers blocked on a full
    /// queue are released.
    fn serialized_stage<R: Rng + ?Sized>(
        &self,
        intake: Intake<'_>,
        session: &mut TemplateSession,
        inputs: &[PathBuf],
        folder: &Path,
        rng: &mut R,
        report: &mut BatchReport,
    ) -> Result<(), BatchError> {
        let Intake { rx, started } = intake;
        let total = inputs.len();
        let budget = self.options.item_timeout;
        // Set once an item has its report entry.
        let mut settled = vec![false; total];
        let mut stalled = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let next = match budget {
                Some(b) => match rx.recv_timeout(b * 2) {
                    Ok(item) => item,
                    Err(RecvTimeoutError::Timeout) => {
                        let in_flight: Vec<(usize, Instant)> = started
                            .iter()
                            .enumerate()
                            .filter(|(index, _)| !settled[*index])
                            .filter_map(|(index, at)| at.get().map(|at| (index, *at)))
                            .collect();
                        if in_flight.is_empty() {
                            warn!(budget = ?b, "Workers stopped responding; stopping");
                            stalled = true;
                            break;
                        }
                        for (index, at) in in_flight {
                            if at.elapsed() > b {
                                settled[index] = true;
                                let filename = display_name(&inputs[index]);
                                warn!(file = %filename, budget = ?b, "Photo timed out");
                                self.record_failure(report, filename, &ItemError::Timeout(b), total);
                            }
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(item) => item,
                    Err(_) => break,
                },
            };
            if self.cancel.is_cancelled() {
                break;
            }
            if settled[next.index] {
                debug!(file = %next.path.display(), "Discarded late result");
                continue;
            }
            settled[next.index] = true;

            let filename = display_name(&next.path);
            let deadline = budget.map(|b| (Instant::now() + b, b));
            let outcome = next
                .result
                .and_then(|fitted| self.composite_and_write(session, fitted, folder, rng, deadline));

            match outcome {
                Ok((output_path, color)) => {
                    debug!(file = %filename, output = %output_path.display(), "Processed");
                    report
                        .items
                        .push(BatchItem::success(filename.clone(), output_path.clone(), color));
                    self.emit(BatchEvent::Success {
                        filename,
                        output_path,
                        color,
                    });
                    self.emit(BatchEvent::Progress {
                        current: report.processed(),
                        total,
                    });
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "Failed to process");
                    self.record_failure(report, filename.clone(), &e, total);
                    if e.severity() == Severity::Fatal {
                        return Err(BatchError::Fatal {
                            filename,
                            source: e,
                        });
                    }
                }
            }
        }
        drop(rx);

        let skipped = settled.iter().filter(|settled| !**settled).count();
        if skipped > 0 {
            if stalled {
                warn!(skipped, "Photos skipped after workers stalled");
            } else {
                info!(skipped, "Batch cancelled");
            }
        }
        report.skipped = skipped;
        report.cancelled = self.cancel.is_cancelled();
        Ok(())
    }

    fn record_failure(
        &self,
        report: &mut BatchReport,
        filename: String,
        error: &ItemError,
        total: usize,
    ) {
        let reason = error.to_string();
        report.items.push(BatchItem::failed(filename.clone(), reason.clone()));
        self.emit(BatchEvent::Error { filename, reason });
        self.emit(BatchEvent::Progress {
            current: report.processed(),
            total,
        });
    }

    fn composite_and_write<R: Rng + ?Sized>(
        &self,
        session: &mut TemplateSession,
        fitted: FittedAsset,
        folder: &Path,
        rng: &mut R,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(PathBuf, OverlayColor), ItemError> {
        let source = fitted.path.clone();
        compose(session, fitted)?;
        let color = recolor(session, rng)?;
        let output = export::write(
            self.backend,
            session,
            folder,
            &source,
            self.options.quality,
            deadline,
        )?;
        Ok((output, color))
    }

    fn close(&self, session: &mut TemplateSession) -> SessionStats {
        match session.close() {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Template close failed");
                session.stats()
            }
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    fn transition(&mut self, next: BatchState) {
        debug!(from = ?self.state, to = ?next, "Batch state");
        self.state = next;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
