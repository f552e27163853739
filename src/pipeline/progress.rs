use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{PipelineError, Result};

/// Shared flag used to stop a run between frames
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }
        Ok(())
    }
}

/// Callback receiving overall progress in `[0, 1]`
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// Turns per-unit fractions into one monotonic overall value
///
/// A run is split into equal units (one per stage, plus one for encoding).
/// Values never decrease, and 1.0 is only ever emitted by [`complete`](Self::complete),
/// exactly once.
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    units: usize,
    last: f64,
    finished: bool,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            units: 1,
            last: 0.0,
            finished: false,
        }
    }

    /// Start a run of `units` equal parts and report 0.0
    pub fn begin(&mut self, units: usize) {
        self.units = units.max(1);
        self.last = 0.0;
        self.finished = false;
        self.emit(0.0);
    }

    /// Report that `unit` is `fraction` done
    pub fn report(&mut self, unit: usize, fraction: f64) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let overall = (unit as f64 + fraction) / self.units as f64;
        // 1.0 is reserved for complete()
        if overall > self.last && overall < 1.0 && !self.finished {
            self.last = overall;
            self.emit(overall);
        }
    }

    pub fn complete(&mut self) {
        if !self.finished {
            self.finished = true;
            self.last = 1.0;
            self.emit(1.0);
        }
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    fn emit(&mut self, value: f64) {
        if let Some(callback) = self.callback.as_mut() {
            callback(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (ProgressTracker, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::<f64>::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(Some(Box::new(move |p: f64| sink.lock().unwrap().push(p))));
        (tracker, seen)
    }

    #[test]
    fn test_progress_is_monotonic_and_completes_once() {
        let (mut tracker, seen) = recorder();
        tracker.begin(2);
        tracker.report(0, 0.5);
        tracker.report(0, 0.25);
        tracker.report(0, 1.0);
        tracker.report(1, 1.0);
        tracker.complete();
        tracker.complete();

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25, 0.5, 1.0]);
        assert_eq!(tracker.last(), 1.0);
    }

    #[test]
    fn test_out_of_range_fractions_are_clamped() {
        let (mut tracker, seen) = recorder();
        tracker.begin(4);
        tracker.report(1, f64::NAN);
        tracker.report(1, 7.0);
        tracker.complete();
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check(),
            Err(crate::VidfxError::Pipeline(PipelineError::Cancelled))
        ));
    }
}
