//! Per-stage latency measurement and reporting for pipeline runs.

use crate::pipeline::types::Stage;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Wall-clock time spent in each stage of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    entries: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the time spent in `stage`.
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push((stage, elapsed));
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn entries(&self) -> &[(Stage, Duration)] {
        &self.entries
    }

    /// Sum of all recorded stages.
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    /// Transcription time over audio duration.
    /// < 1.0 means faster than real-time, > 1.0 means slower.
    pub fn realtime_factor(&self, audio_duration: Duration) -> f64 {
        if audio_duration.is_zero() {
            return 0.0;
        }
        self.get(Stage::Transcribing)
            .unwrap_or_default()
            .as_secs_f64()
            / audio_duration.as_secs_f64()
    }

    /// One-line summary, e.g. "normalizing 12ms, transcribing 1.2s (total 1.2s)".
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "no stages ran".to_string();
        }
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(stage, d)| format!("{} {}", stage, format_duration(*d)))
            .collect();
        format!(
            "{} (total {})",
            parts.join(", "),
            format_duration(self.total())
        )
    }
}

/// Serialized as `{"<stage>_ms": <millis>, ..., "total_ms": <millis>}`.
impl Serialize for StageTimings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len() + 1))?;
        for (stage, elapsed) in &self.entries {
            map.serialize_entry(&format!("{}_ms", stage), &(elapsed.as_millis() as u64))?;
        }
        map.serialize_entry("total_ms", &(self.total().as_millis() as u64))?;
        map.end()
    }
}

/// Formats a duration as a human-friendly string.
/// Under 1s: "450ms", at or above 1s: "1.5s".
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
