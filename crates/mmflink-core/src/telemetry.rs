//! Temperature samples and job progress.

use serde::{Deserialize, Serialize};

/// One temperature callback from the local printer.
///
/// Either reading may be absent when the printer only reported one heater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSample {
    /// Actual hotend (`tool0`) temperature.
    pub hotend: Option<f64>,
    /// Actual bed temperature.
    pub bed: Option<f64>,
}

impl TemperatureSample {
    pub fn new(hotend: Option<f64>, bed: Option<f64>) -> Self {
        Self { hotend, bed }
    }
}

/// Last known heater temperatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub hotend: f64,
    pub bed: f64,
}

impl Temperatures {
    /// Merge a sample, keeping the previous value for any missing reading.
    pub fn record(&mut self, sample: TemperatureSample) {
        if let Some(hotend) = sample.hotend {
            self.hotend = hotend;
        }
        if let Some(bed) = sample.bed {
            self.bed = bed;
        }
    }
}

/// Live job state reported by the local printer.
///
/// Every field may be unknown, e.g. before the first progress report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Completion in percent.
    pub completion: Option<f64>,
    /// Seconds left.
    pub print_time_left: Option<f64>,
    /// Estimated total seconds.
    pub estimated_print_time: Option<f64>,
}

impl JobProgress {
    /// Whole-percent completion, `0` when unknown.
    pub fn progress_percent(&self) -> i64 {
        truncate(self.completion)
    }

    pub fn remaining_secs(&self) -> i64 {
        truncate(self.print_time_left)
    }

    pub fn total_secs(&self) -> i64 {
        truncate(self.estimated_print_time)
    }
}

fn truncate(value: Option<f64>) -> i64 {
    match value {
        Some(v) if v.is_finite() => v.trunc() as i64,
        _ => 0,
    }
}

/// Render a temperature the way status reports carry it.
///
/// Whole numbers keep one decimal place (`60.0`, not `60`).
pub fn format_temperature(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
