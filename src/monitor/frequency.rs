// Message rate check over a sliding window of diagnostic periods

use std::collections::VecDeque;

use crate::messages::{DiagnosticLevel, DiagnosticStatus};

const WINDOW_SIZE: usize = 5;
const TOLERANCE: f64 = 0.01;

/// Counts events on one topic and checks the rate stays within `[min, max]` Hz
pub struct FrequencyMonitor {
    name: String,
    min_frequency: f64,
    max_frequency: f64,
    count: u64,
    // (time, count) at each of the last WINDOW_SIZE diagnostic updates
    history: VecDeque<(f64, u64)>,
}

impl FrequencyMonitor {
    pub fn new(name: &str, min_frequency: f64, max_frequency: f64, now: f64) -> Self {
        Self {
            name: name.to_string(),
            min_frequency,
            max_frequency,
            count: 0,
            history: std::iter::repeat((now, 0)).take(WINDOW_SIZE).collect(),
        }
    }

    /// Record one event
    pub fn tick(&mut self) {
        self.count += 1;
    }

    /// Close the current diagnostic period and report the rate over the window
    pub fn update(&mut self, now: f64) -> DiagnosticStatus {
        let (window_start, start_count) = self.history.pop_front().unwrap_or((now, self.count));
        self.history.push_back((now, self.count));

        let events = self.count - start_count;
        let window = now - window_start;
        let frequency = if window > 0.0 { events as f64 / window } else { 0.0 };

        let mut stat = DiagnosticStatus::new(&format!("{} frequency", self.name));
        if events == 0 {
            stat.summary(DiagnosticLevel::Error, "No events recorded.");
        } else if frequency < self.min_frequency * (1.0 - TOLERANCE) {
            stat.summary(DiagnosticLevel::Warn, "Frequency too low.");
        } else if frequency > self.max_frequency * (1.0 + TOLERANCE) {
            stat.summary(DiagnosticLevel::Warn, "Frequency too high.");
        } else {
            stat.summary(DiagnosticLevel::Ok, "Desired frequency met");
        }

        stat.add("Events in window", events);
        stat.add("Events since startup", self.count);
        stat.add("Duration of window (s)", format!("{:.3}", window));
        stat.add("Actual frequency (Hz)", format!("{:.3}", frequency));
        if self.min_frequency == self.max_frequency {
            stat.add("Target frequency (Hz)", self.min_frequency);
        } else {
            stat.add("Minimum acceptable frequency (Hz)", self.min_frequency);
            stat.add("Maximum acceptable frequency (Hz)", self.max_frequency);
        }
        stat
    }
}
