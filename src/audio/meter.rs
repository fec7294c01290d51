//! Current/peak level tracking and meter scaling

use serde::Serialize;

use super::level::LoudnessSample;

/// Level at which the visual meter is full
pub const SCALE_MAX: LoudnessSample = 120;

/// Running meter state fed by [`estimate_level`](super::level::estimate_level).
///
/// Only [`ingest`](Self::ingest) and [`reset`](Self::reset) mutate it. The
/// peak is monotonically non-decreasing between resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeterState {
    current_level: LoudnessSample,
    max_level: LoudnessSample,
    fill_ratio: f64,
}

impl MeterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the level of the latest chunk.
    pub fn ingest(&mut self, sample: LoudnessSample) {
        self.current_level = sample;
        self.max_level = self.max_level.max(sample);
        self.fill_ratio = fill_ratio_for(sample);
    }

    /// Start a fresh peak-tracking session. The current level is kept.
    pub fn reset(&mut self) {
        self.max_level = 0;
    }

    pub fn current_level(&self) -> LoudnessSample {
        self.current_level
    }

    pub fn max_level(&self) -> LoudnessSample {
        self.max_level
    }

    /// Portion of the meter to draw filled, in `[0, 1]`
    pub fn fill_ratio(&self) -> f64 {
        self.fill_ratio
    }
}

/// Levels above [`SCALE_MAX`] saturate at 1.
fn fill_ratio_for(sample: LoudnessSample) -> f64 {
    (f64::from(sample) / f64::from(SCALE_MAX)).clamp(0.0, 1.0)
}
