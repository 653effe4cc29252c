//! Progress indicators for the kubegen CLI.
//!
//! Spinners animate on indicatif's steady-tick thread. The generator only
//! pushes status text into them through [`SpinnerReporter`].

use colored::Colorize;
use fixturekit::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Create a spinner with a message, hidden when `quiet`
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["|", "/", "-", "\\", "✓"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK_INTERVAL);
    pb
}

/// Finish a spinner with a success message
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    if !pb.is_hidden() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Finish a spinner with an error message
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    eprintln!("{} {}", "✗".red(), msg);
}

/// Forwards generator ticks to a spinner
pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressReporter for SpinnerReporter {
    fn tick(&mut self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}
