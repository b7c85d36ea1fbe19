//! Progress indicators for interactive pack runs
//!
//! Bars draw to stderr and hide themselves when it is not a terminal.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Style presets for different types of progress indicators
pub struct ProgressStyles;

impl ProgressStyles {
    /// Inputs collected so far
    pub fn inputs() -> ProgressStyle {
        style("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("█▓▒░  ")
    }

    /// Indeterminate operations
    pub fn spinner() -> ProgressStyle {
        style("{spinner:.green} {msg} [{elapsed_precise}]").tick_strings(SPINNER_TICKS)
    }

    pub fn success() -> ProgressStyle {
        style("{prefix:.green} {msg}")
    }

    pub fn error() -> ProgressStyle {
        style("{prefix:.red} {msg}")
    }
}

/// Progress tracker for pack operations
pub struct PackProgress {
    multi: MultiProgress,
}

impl PackProgress {
    /// Create a new pack progress tracker
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// Tracker that never draws
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
        }
    }

    /// Create a spinner for an indeterminate operation
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyles::spinner());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Create a bar counting collected inputs
    pub fn inputs(&self, total: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyles::inputs());
        pb.set_message(msg.to_string());
        pb
    }

    /// Print a success message
    pub fn success(&self, msg: &str) {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(ProgressStyles::success());
        pb.set_prefix("✓");
        pb.finish_with_message(msg.to_string());
    }

    /// Print an info line above the bars
    pub fn info(&self, msg: &str) {
        self.multi.println(format!("  ℹ {}", msg)).ok();
    }
}

impl Default for PackProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for progress bar operations
pub trait ProgressExt {
    /// Finish with a success message
    fn finish_success(&self, msg: &str);

    /// Finish with an error message
    fn finish_error(&self, msg: &str);

    /// Update message and increment
    fn tick_with_message(&self, msg: &str);
}

impl ProgressExt for ProgressBar {
    fn finish_success(&self, msg: &str) {
        self.set_style(ProgressStyles::success());
        self.set_prefix("✓");
        self.finish_with_message(msg.to_string());
    }

    fn finish_error(&self, msg: &str) {
        self.set_style(ProgressStyles::error());
        self.set_prefix("✗");
        self.finish_with_message(msg.to_string());
    }

    fn tick_with_message(&self, msg: &str) {
        self.set_message(msg.to_string());
        self.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress() {
        let progress = PackProgress::hidden();
        let pb = progress.inputs(2, "Collecting");
        pb.tick_with_message("a.jar");
        pb.tick_with_message("b.jar");
        assert_eq!(pb.position(), 2);
        pb.finish_success("done");

        let spinner = progress.spinner("Writing metadata");
        assert_eq!(spinner.message(), "Writing metadata");
        spinner.finish_error("failed");
        assert!(spinner.is_finished());
        progress.info("note");
        progress.success("packed");
    }
}
