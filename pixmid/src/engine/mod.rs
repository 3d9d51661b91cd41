//! Conversion engine
//!
//! Turns one source image into per-track note events. Each run goes through
//! three stages on a dedicated worker thread:
//!
//! 1. **Resizing**: resample the source to one column per key
//! 2. **Classifying**: map every pixel to a palette index (parallel over rows)
//! 3. **Scanning**: walk rows bottom to top and emit NoteOn/NoteOff events
//!
//! Cooperative cancellation is honored up to the scan. With protection
//! enabled the scan runs to completion regardless of [`ConversionEngine::cancel`];
//! only [`ConversionEngine::force_cancel`] stops it.

mod control;
mod scan;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pixmid_resample::PixelGrid;
use tracing::{debug, warn};

use crate::classify::{Classifier, classify_grid};
use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::events::ConversionResult;
use crate::keys::KeyLayout;
use crate::palette::Palette;

use control::{RunControl, lock};

// ============================================================================
// Run state
// ============================================================================

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConversionState {
    NotStarted = 0,
    Running = 1,
    /// Scanning; cooperative cancel is deferred
    Protected = 2,
    Completed = 3,
    Cancelled = 4,
    Failed = 5,
}

impl ConversionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConversionState::NotStarted,
            1 => ConversionState::Running,
            2 => ConversionState::Protected,
            3 => ConversionState::Completed,
            4 => ConversionState::Cancelled,
            _ => ConversionState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversionState::Completed | ConversionState::Cancelled | ConversionState::Failed
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ConversionState::NotStarted => "not started",
            ConversionState::Running => "running",
            ConversionState::Protected => "protected",
            ConversionState::Completed => "completed",
            ConversionState::Cancelled => "cancelled",
            ConversionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline stage reported through progress callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resizing,
    Classifying,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    /// 0.0..=1.0 within the stage
    pub fraction: f32,
}

/// Progress callback, invoked on the worker thread
pub type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Final outcome handed to the completion callback
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Arc<ConversionResult>),
    Cancelled,
    Failed(ConversionError),
}

impl RunOutcome {
    pub fn state(&self) -> ConversionState {
        match self {
            RunOutcome::Completed(_) => ConversionState::Completed,
            RunOutcome::Cancelled => ConversionState::Cancelled,
            RunOutcome::Failed(_) => ConversionState::Failed,
        }
    }

    fn of(control: &RunControl) -> Self {
        match (control.state(), control.result(), control.error()) {
            (ConversionState::Completed, Some(result), _) => RunOutcome::Completed(result),
            (ConversionState::Failed, _, Some(error)) => RunOutcome::Failed(error),
            _ => RunOutcome::Cancelled,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

struct Inner {
    palette: Arc<Palette>,
    source: Arc<PixelGrid>,
    config: ConversionConfig,
    classifier: Arc<dyn Classifier>,
    /// Most recent run; older runs are superseded
    current: Mutex<Option<Arc<RunControl>>>,
    next_id: AtomicU64,
}

/// Converts one image against one palette
///
/// Cloning is cheap and clones share runs, so a progress callback can hold a
/// clone to cancel its own run.
#[derive(Clone)]
pub struct ConversionEngine {
    inner: Arc<Inner>,
}

impl ConversionEngine {
    /// Create an engine using the classifier named in `config`
    pub fn new(
        palette: Arc<Palette>,
        source: PixelGrid,
        config: ConversionConfig,
    ) -> Result<Self, ConversionError> {
        let classifier = config.classifier.build(&palette);
        Self::with_classifier(palette, source, config, classifier)
    }

    /// Create an engine with a custom classifier
    pub fn with_classifier(
        palette: Arc<Palette>,
        source: PixelGrid,
        config: ConversionConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, ConversionError> {
        if palette.is_empty() {
            return Err(ConversionError::InvalidPalette("palette is empty".into()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                palette,
                source: Arc::new(source),
                config,
                classifier,
                current: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create an engine from a raw RGBA buffer with `stride` bytes per row
    pub fn from_raw(
        palette: Arc<Palette>,
        pixels: Vec<u8>,
        stride: usize,
        config: ConversionConfig,
    ) -> Result<Self, ConversionError> {
        let source = PixelGrid::new(pixels, stride)?;
        Self::new(palette, source, config)
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.inner.palette
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.inner.config
    }

    pub fn source(&self) -> &PixelGrid {
        &self.inner.source
    }

    /// Start a run on a worker thread
    ///
    /// Any previous run is cancelled first (a protected run finishes, but its
    /// result is no longer reachable through this engine). `on_complete`
    /// fires exactly once with the outcome.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad key layout or note length policy, checked
    /// before anything is spawned.
    pub fn run<F>(
        &self,
        on_complete: F,
        on_progress: Option<ProgressFn>,
        enable_protection: bool,
    ) -> Result<(), ConversionError>
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        let layout = self.inner.config.key_layout()?;
        let control = self.begin_run();
        let id = control.id;

        let inner = Arc::clone(&self.inner);
        let worker = Arc::clone(&control);
        let spawned = thread::Builder::new()
            .name(format!("pixmid-convert-{id}"))
            .spawn(move || {
                let outcome = inner.run_guarded(&worker, &layout, on_progress.as_ref(), enable_protection);
                on_complete(outcome);
            });

        if let Err(e) = spawned {
            let error = ConversionError::RuntimeFailure(format!(
                "failed to spawn conversion thread: {e}"
            ));
            control.finish(Err(error.clone()));
            return Err(error);
        }
        Ok(())
    }

    /// Start a protected run without callbacks; poll with [`Self::wait_for_completion`]
    pub fn start(&self) -> Result<(), ConversionError> {
        self.run(|_| {}, None, true)
    }

    /// Run on the calling thread and return the result
    ///
    /// The run is registered like an asynchronous one, so another thread may
    /// still cancel it before the scan starts.
    pub fn convert(&self) -> Result<Arc<ConversionResult>, ConversionError> {
        let layout = self.inner.config.key_layout()?;
        let control = self.begin_run();
        match self.inner.run_guarded(&control, &layout, None, true) {
            RunOutcome::Completed(result) => Ok(result),
            RunOutcome::Cancelled => Err(ConversionError::NotCompleted(ConversionState::Cancelled)),
            RunOutcome::Failed(error) => Err(error),
        }
    }

    /// Cooperative cancel of the current run; false if it is already
    /// protected, finished, or there is no run
    pub fn cancel(&self) -> bool {
        self.current().is_some_and(|control| control.cancel())
    }

    /// Cancel even mid-scan; for shutdown only, the run produces no result
    pub fn force_cancel(&self) -> bool {
        let Some(control) = self.current() else {
            return false;
        };
        let cancelled = control.force_cancel();
        if cancelled {
            warn!(run = control.id, "conversion force-cancelled");
        }
        cancelled
    }

    /// State of the current run (`NotStarted` if none was ever started)
    pub fn state(&self) -> ConversionState {
        self.current()
            .map_or(ConversionState::NotStarted, |control| control.state())
    }

    /// Block until the current run finishes or `timeout` elapses
    ///
    /// A timeout does not affect the run.
    pub fn wait_for_completion(&self, timeout: Duration) -> Result<ConversionState, ConversionError> {
        let Some(control) = self.current() else {
            return Ok(ConversionState::NotStarted);
        };
        if control.wait(timeout) {
            Ok(control.state())
        } else {
            Err(ConversionError::Timeout(timeout))
        }
    }

    /// Events of the current run once it has completed
    pub fn result(&self) -> Result<Arc<ConversionResult>, ConversionError> {
        let Some(control) = self.current() else {
            return Err(ConversionError::NotCompleted(ConversionState::NotStarted));
        };
        match RunOutcome::of(&control) {
            RunOutcome::Completed(result) => Ok(result),
            RunOutcome::Failed(error) => Err(error),
            RunOutcome::Cancelled => Err(ConversionError::NotCompleted(control.state())),
        }
    }

    fn current(&self) -> Option<Arc<RunControl>> {
        lock(&self.inner.current).clone()
    }

    /// Register a fresh run and supersede the previous one
    fn begin_run(&self) -> Arc<RunControl> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(RunControl::new(id));
        let previous = lock(&self.inner.current).replace(Arc::clone(&control));
        if let Some(previous) = previous
            && !previous.state().is_terminal()
        {
            let accepted = previous.cancel();
            debug!(run = previous.id, superseded_by = id, accepted, "run superseded");
        }
        control
    }
}

// ============================================================================
// Pipeline
// ============================================================================

impl Inner {
    /// Execute a run, catching panics, and record the outcome
    fn run_guarded(
        &self,
        control: &RunControl,
        layout: &KeyLayout,
        on_progress: Option<&ProgressFn>,
        enable_protection: bool,
    ) -> RunOutcome {
        let executed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(control, layout, on_progress, enable_protection)
        }));
        let outcome = match executed {
            Ok(outcome) => outcome.map(|result| result.map(Arc::new)),
            Err(payload) => Err(ConversionError::RuntimeFailure(panic_message(payload))),
        };
        if let Err(e) = &outcome {
            warn!(run = control.id, error = %e, "conversion failed");
        }

        let state = control.finish(outcome);
        let outcome = RunOutcome::of(control);
        match &outcome {
            RunOutcome::Completed(result) => debug!(
                run = control.id,
                notes = result.note_count(),
                events = result.event_count(),
                "conversion completed"
            ),
            _ => debug!(run = control.id, %state, "conversion finished without result"),
        }
        outcome
    }

    /// `Ok(None)` means the run was cancelled
    fn execute(
        &self,
        control: &RunControl,
        layout: &KeyLayout,
        on_progress: Option<&ProgressFn>,
        enable_protection: bool,
    ) -> Result<Option<ConversionResult>, ConversionError> {
        let report = |stage: Stage, fraction: f32| {
            if let Some(f) = on_progress {
                f(Progress { stage, fraction });
            }
        };

        if !control.transition(ConversionState::NotStarted, ConversionState::Running) {
            return Ok(None);
        }

        let width = layout.width();
        let height = self.config.target_height.unwrap_or(self.source.height());
        debug!(
            run = control.id,
            width,
            height,
            keys = layout.active_count(),
            policy = ?self.config.note_length,
            "conversion started"
        );

        report(Stage::Resizing, 0.0);
        let resized = self.source.resized(width, height, self.config.resample)?;
        report(Stage::Resizing, 1.0);
        if control.is_cancelled() {
            return Ok(None);
        }

        report(Stage::Classifying, 0.0);
        let grid = classify_grid(
            &resized,
            self.classifier.as_ref(),
            self.palette.len(),
            self.config.alpha_threshold,
        )?;
        drop(resized);
        report(Stage::Classifying, 1.0);

        if enable_protection {
            if !control.transition(ConversionState::Running, ConversionState::Protected) {
                return Ok(None);
            }
            debug!(run = control.id, "entered protected scan");
        } else if control.is_cancelled() {
            return Ok(None);
        }

        report(Stage::Scanning, 0.0);
        let step = (height / 100).max(1);
        let tracks = scan::scan(
            &grid,
            layout,
            self.config.note_length,
            self.palette.len(),
            |rows| {
                if rows % step == 0 || rows == height {
                    report(Stage::Scanning, rows as f32 / height as f32);
                }
                !control.is_cancelled()
            },
        );

        Ok(tracks.map(|tracks| ConversionResult::new(width, height, tracks)))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".into()
    }
}
