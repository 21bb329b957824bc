//! Progress reporting and cooperative cancellation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

/// Receives evaluation progress, typically implemented by a UI layer
pub trait Reporter: Send + Sync {
    fn on_begin(&self, message: &str);

    /// Overall completion in `0.0..=1.0`
    fn on_progress(&self, fraction: f32);

    fn on_end(&self, _elapsed: Duration) {}
}

/// Reports through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_begin(&self, message: &str) {
        info!("{}", message);
    }

    fn on_progress(&self, fraction: f32) {
        debug!("Progress: {:.0}%", fraction * 100.0);
    }

    fn on_end(&self, elapsed: Duration) {
        info!("Evaluation finished in {:.2} ms", elapsed.as_secs_f64() * 1000.0);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_begin(&self, _message: &str) {}

    fn on_progress(&self, _fraction: f32) {}
}

/// Shared progress accumulator plus the interruption flag.
///
/// Parallel loops add deltas concurrently; only the accumulator is locked.
#[derive(Clone)]
pub struct ProgressTracker {
    reporter: Arc<dyn Reporter>,
    accumulated: Arc<Mutex<f32>>,
    interrupted: Arc<AtomicBool>,
}

impl ProgressTracker {
    pub fn new(reporter: Arc<dyn Reporter>, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            reporter,
            accumulated: Arc::new(Mutex::new(0.0)),
            interrupted,
        }
    }

    /// Reset the accumulator and announce a new pass
    pub fn begin(&self, message: &str) {
        *self.lock() = 0.0;
        self.reporter.on_begin(message);
    }

    /// Add a progress delta and report the new total
    pub fn advance(&self, delta: f32) {
        let total = {
            let mut accumulated = self.lock();
            *accumulated = (*accumulated + delta).clamp(0.0, 1.0);
            *accumulated
        };
        self.reporter.on_progress(total);
    }

    pub fn end(&self, elapsed: Duration) {
        self.reporter.on_end(elapsed);
    }

    pub fn fraction(&self) -> f32 {
        *self.lock()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, f32> {
        self.accumulated.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(Arc::new(NullReporter), Arc::new(AtomicBool::new(false)))
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("fraction", &self.fraction())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
