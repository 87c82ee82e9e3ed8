//! Progress tracking for long export runs.
//!
//! Calculates completion percentage, processing rate and remaining time, and decides
//! when a periodic `[PROGRESS]` log line is due.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress state for one run
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Events finished in this run (success or failure)
    pub events_done: u64,
    /// Events this run intends to process
    pub total_expected: u64,
    /// Events finished before this run started
    pub already_done: u64,
    /// When the run started
    pub start_time: Instant,
    /// Last time progress was reported
    pub last_update: Instant,
    /// Minimum interval between time-based updates
    pub update_interval: Duration,
    /// Events per second
    pub current_rate: f64,
    /// Last reported completion percentage (0-100)
    pub last_reported_percentage: f64,
    /// Minimum percentage delta that forces an update
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Create a state for `total_expected` events, `already_done` of the overall list
    /// having been finished by earlier runs
    pub fn new(total_expected: u64, already_done: u64) -> Self {
        let now = Instant::now();
        Self {
            events_done: 0,
            total_expected,
            already_done,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Override the update cadence
    pub fn with_cadence(mut self, update_interval: Duration, min_percentage_step: f64) -> Self {
        self.update_interval = update_interval;
        self.min_percentage_step = min_percentage_step;
        self
    }

    /// Count one finished event
    pub fn record_event(&mut self) {
        self.events_done = self.events_done.saturating_add(1);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.events_done as f64 / elapsed;
        }
    }

    /// Whether a progress update is due, by percentage jump or elapsed time
    pub fn should_emit_update(&self) -> bool {
        if self.events_done == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.last_update.elapsed() >= self.update_interval
    }

    /// Reset the timer and cached percentage after logging
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion of this run (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total_expected == 0 {
            return 100.0;
        }
        (self.events_done as f64 / self.total_expected as f64 * 100.0).min(100.0)
    }

    /// Remaining time at the current rate
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_expected.saturating_sub(self.events_done);
        if remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress line
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Processed {}/{} events - {:.1}% complete",
            self.events_done,
            self.total_expected,
            self.percentage()
        )];

        if self.already_done > 0 {
            parts.push(format!("(resumed after {})", self.already_done));
        }

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.2} events/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Compact duration for log lines: `45s`, `12m`, `3.5h`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
