//! Progress reporting for a running job.
//!
//! Progress is a pure function of "units finished / units total" within the
//! current stage ([`percent`]). It is not persisted: a resumed run starts
//! counting again from the first unit, with skipped units advancing the bar
//! just like produced ones.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] into the
//! [`crate::orchestrator::Pipeline`] to receive events. The worker runs on a
//! different thread than the front end, so the trait is `Send + Sync`. For
//! front ends that prefer polling, [`AtomicProgress`] records the latest
//! values in atomics.
//!
//! # Example
//!
//! ```rust
//! use illuminate::{AtomicProgress, JobProgressCallback, Stage};
//!
//! let sink = AtomicProgress::new();
//! sink.on_progress(Stage::Scan, 40.0);
//! assert_eq!(sink.percent(), 40.0);
//! assert_eq!(sink.stage(), Some(Stage::Scan));
//! ```

use crate::error::IlluminateError;
use crate::job::{JobState, Stage};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Percentage of `completed` out of `total`, clamped to `[0, 100]`.
///
/// An empty stage is complete.
pub fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (completed.min(total) as f64 / total as f64) * 100.0
}

/// What happened to one unit inside a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The artifact already existed; no delegate call.
    Skipped,
    /// The delegate ran and the artifact was persisted.
    Produced,
}

/// Called by the orchestrator and stage runners as the job advances.
///
/// All methods have no-op defaults so callers only override what they need.
pub trait JobProgressCallback: Send + Sync {
    /// The orchestrator entered `state`.
    fn on_state(&self, state: JobState) {
        let _ = state;
    }

    /// A stage is about to process `total` units.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// A unit finished, either skipped or produced.
    fn on_unit(&self, stage: Stage, index: usize, outcome: UnitOutcome) {
        let _ = (stage, index, outcome);
    }

    /// Stage progress in `[0, 100]`, after every unit.
    fn on_progress(&self, stage: Stage, percent: f64) {
        let _ = (stage, percent);
    }

    /// The job reached `Done`. Front ends release transient resources here.
    fn on_job_complete(&self) {}

    /// The job reached `Failed`.
    fn on_job_failed(&self, error: &IlluminateError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by [`crate::orchestrator::Pipeline`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

const NO_STAGE: u8 = u8::MAX;

/// Pollable progress sink.
///
/// Stores the latest percentage, stage, and completion flag with
/// release/acquire ordering so a reader on another thread sees a consistent
/// recent value.
#[derive(Debug)]
pub struct AtomicProgress {
    percent_bits: AtomicU64,
    stage: AtomicU8,
    finished: AtomicBool,
    failed: AtomicBool,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self {
            percent_bits: AtomicU64::new(0f64.to_bits()),
            stage: AtomicU8::new(NO_STAGE),
            finished: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    pub fn percent(&self) -> f64 {
        f64::from_bits(self.percent_bits.load(Ordering::Acquire))
    }

    pub fn stage(&self) -> Option<Stage> {
        Stage::ALL
            .get(self.stage.load(Ordering::Acquire) as usize)
            .copied()
    }

    /// True once the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

impl JobProgressCallback for AtomicProgress {
    fn on_stage_start(&self, stage: Stage, _total: usize) {
        let idx = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.stage.store(idx as u8, Ordering::Release);
        self.percent_bits.store(0f64.to_bits(), Ordering::Release);
    }

    fn on_progress(&self, stage: Stage, percent: f64) {
        let idx = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.stage.store(idx as u8, Ordering::Release);
        self.percent_bits.store(percent.to_bits(), Ordering::Release);
    }

    fn on_job_complete(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn on_job_failed(&self, _error: &IlluminateError) {
        self.failed.store(true, Ordering::Release);
        self.finished.store(true, Ordering::Release);
    }
}

/// Cooperative cancellation, checked before each unit.
///
/// A running unit is never interrupted; the stage stops before the next one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 4), 0.0);
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(4, 4), 100.0);
        assert_eq!(percent(9, 4), 100.0);
        assert_eq!(percent(0, 0), 100.0);
    }

    #[test]
    fn percent_monotonic_over_ten_units() {
        let values: Vec<f64> = (0..=10).map(|i| percent(i, 10)).collect();
        assert_eq!(values.first(), Some(&0.0));
        assert_eq!(values.last(), Some(&100.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_state(JobState::Scanning);
        cb.on_stage_start(Stage::Scan, 3);
        cb.on_unit(Stage::Scan, 0, UnitOutcome::Skipped);
        cb.on_progress(Stage::Scan, 33.3);
        cb.on_job_complete();
        cb.on_job_failed(&IlluminateError::Internal("x".into()));
    }

    #[test]
    fn atomic_progress_across_threads() {
        let sink = Arc::new(AtomicProgress::new());
        assert_eq!(sink.stage(), None);

        let writer = Arc::clone(&sink);
        std::thread::spawn(move || {
            writer.on_stage_start(Stage::Transcribe, 2);
            writer.on_progress(Stage::Transcribe, 50.0);
            writer.on_job_complete();
        })
        .join()
        .unwrap();

        assert_eq!(sink.stage(), Some(Stage::Transcribe));
        assert_eq!(sink.percent(), 50.0);
        assert!(sink.is_finished());
        assert!(!sink.is_failed());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
