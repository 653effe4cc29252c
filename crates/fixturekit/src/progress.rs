//! Progress reporting port.
//!
//! The engine calls [`ProgressReporter::tick`] now and then with a short
//! status line. Reporters only display; they never see engine state, so
//! swapping one for [`NoProgress`] cannot change what gets generated.

/// Receiver of progress ticks.
pub trait ProgressReporter {
    /// Called periodically with a human-readable status.
    fn tick(&mut self, message: &str);
}

/// Reporter that ignores every tick.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn tick(&mut self, _message: &str) {}
}
