//! Timing instrumentation for the processing pipeline.
//!
//! Timings are accumulated per file and summed over a batch.

use serde::Serialize;
use std::time::Duration;

/// Accumulated wall time of each processing stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageTimings {
    pub peak_spotting: Duration,
    pub deconvolution: Duration,
    pub annotation: Duration,
    pub alignment: Duration,
    pub gap_filling: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.peak_spotting + self.deconvolution + self.annotation + self.alignment + self.gap_filling
    }
}

impl Serialize for StageTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StageTimings", 5)?;
        state.serialize_field("peak_spotting_ms", &self.peak_spotting.as_millis())?;
        state.serialize_field("deconvolution_ms", &self.deconvolution.as_millis())?;
        state.serialize_field("annotation_ms", &self.annotation.as_millis())?;
        state.serialize_field("alignment_ms", &self.alignment.as_millis())?;
        state.serialize_field("gap_filling_ms", &self.gap_filling.as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for StageTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.peak_spotting += rhs.peak_spotting;
        self.deconvolution += rhs.deconvolution;
        self.annotation += rhs.annotation;
        self.alignment += rhs.alignment;
        self.gap_filling += rhs.gap_filling;
    }
}
