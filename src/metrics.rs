//! Timing of launcher startup
//!
//! Set `JAPP_METRICS=1` to log a report before the application starts.

use std::time::{Duration, Instant};

/// Performance metrics for a packed application launch
#[derive(Debug)]
pub struct LaunchMetrics {
    /// When measurement started
    start: Instant,
    /// Footer and header validated
    pub layout_read: Option<Duration>,
    /// Metadata read and decompressed
    pub metadata_read: Option<Duration>,
    /// Boot module available on disk
    pub boot_ready: Option<Duration>,
    /// Java command composed
    pub command_built: Option<Duration>,
    /// Child process spawned
    pub spawned: Option<Duration>,
    /// Individual phase timings for detailed analysis
    phases: Vec<(String, Duration)>,
}

impl Default for LaunchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            layout_read: None,
            metadata_read: None,
            boot_ready: None,
            command_built: None,
            spawned: None,
            phases: Vec::new(),
        }
    }

    /// Whether metrics reporting was requested through the environment
    pub fn enabled() -> bool {
        std::env::var("JAPP_METRICS").is_ok_and(|v| !v.is_empty() && v != "0")
    }

    /// Log filter `base`, widened so [`LaunchMetrics::log_report`] is shown when `enabled`
    pub fn log_filter(base: &str, enabled: bool) -> String {
        if enabled {
            format!("{},{}=info", base, module_path!())
        } else {
            base.to_string()
        }
    }

    /// Footer and header have been validated
    pub fn mark_layout_read(&mut self) {
        self.layout_read = Some(self.start.elapsed());
    }

    /// Metadata has been read and decompressed
    pub fn mark_metadata_read(&mut self) {
        self.metadata_read = Some(self.start.elapsed());
    }

    /// Boot module is available on disk
    pub fn mark_boot_ready(&mut self) {
        self.boot_ready = Some(self.start.elapsed());
    }

    /// `java` command has been composed
    pub fn mark_command_built(&mut self) {
        self.command_built = Some(self.start.elapsed());
    }

    /// Child process has been spawned
    pub fn mark_spawned(&mut self) {
        self.spawned = Some(self.start.elapsed());
    }

    /// Add a custom phase timing
    pub fn add_phase(&mut self, name: impl Into<String>, duration: Duration) {
        self.phases.push((name.into(), duration));
    }

    /// Time a closure and record it as a phase
    pub fn time_phase<F, R>(&mut self, name: impl Into<String>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let phase_start = Instant::now();
        let result = f();
        self.phases.push((name.into(), phase_start.elapsed()));
        result
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn format_duration(d: Duration) -> String {
        let ms = d.as_secs_f64() * 1000.0;
        if ms < 1.0 {
            format!("{}µs", d.as_micros())
        } else if ms < 1000.0 {
            format!("{:.2}ms", ms)
        } else {
            format!("{:.2}s", d.as_secs_f64())
        }
    }

    fn format_delta(prev: Option<Duration>, curr: Duration) -> String {
        match prev {
            Some(p) if curr > p => format!("+{}", Self::format_duration(curr - p)),
            Some(_) => String::new(),
            None => format!("+{}", Self::format_duration(curr)),
        }
    }

    /// Generate a formatted performance report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("=== Launcher Startup Performance ===".to_string());
        lines.push(format!(
            "Total elapsed: {}",
            Self::format_duration(self.elapsed())
        ));
        lines.push(String::new());
        lines.push("--- Main Phases ---".to_string());

        let marks = [
            ("Layout read:", self.layout_read),
            ("Metadata read:", self.metadata_read),
            ("Boot ready:", self.boot_ready),
            ("Command built:", self.command_built),
            ("Spawned:", self.spawned),
        ];

        let mut prev: Option<Duration> = None;
        for (label, mark) in marks {
            if let Some(d) = mark {
                lines.push(format!(
                    "  {:<20} {:>10} ({})",
                    label,
                    Self::format_duration(d),
                    Self::format_delta(prev, d)
                ));
                prev = Some(d);
            }
        }

        if !self.phases.is_empty() {
            lines.push(String::new());
            lines.push("--- Detailed Phases ---".to_string());
            for (name, duration) in &self.phases {
                lines.push(format!(
                    "  {:<20} {:>10}",
                    name,
                    Self::format_duration(*duration)
                ));
            }
        }

        lines.push("=".repeat(40));
        lines.join("\n")
    }

    /// Log the report at `info` under this module's target
    pub fn log_report(&self) {
        for line in self.report().lines() {
            if line.is_empty() {
                continue;
            }
            tracing::info!("{}", line);
        }
    }
}
