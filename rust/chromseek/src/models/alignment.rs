use chromquery::ChromXs;
use serde::{
    Deserialize,
    Serialize,
};

use super::match_result::MsScanMatchResult;

/// Slot lifecycle: `Detected` is final, `Gap` goes through gap filling and
/// ends up `GapFilled` or `Unfillable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakSlotState {
    Detected,
    Gap,
    GapFilled,
    Unfillable,
}

/// Peak id of slots without a detected feature.
pub const NOT_DETECTED_PEAK_ID: i64 = -1;

/// What one file contributes to an alignment spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPeakProperty {
    pub file_id: usize,
    /// `peak_id <= -1` means the file had no feature for this spot.
    pub peak_id: i64,
    pub chrom: ChromXs,
    pub mass: f64,
    pub height: f64,
    pub area: f64,
    pub ms2_raw_scan: Option<usize>,
    pub state: PeakSlotState,
}

impl AlignedPeakProperty {
    pub fn gap(file_id: usize, chrom: ChromXs, mass: f64) -> Self {
        Self {
            file_id,
            peak_id: NOT_DETECTED_PEAK_ID,
            chrom,
            mass,
            height: 0.0,
            area: 0.0,
            ms2_raw_scan: None,
            state: PeakSlotState::Gap,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.peak_id > NOT_DETECTED_PEAK_ID
    }
}

/// Consensus of one compound across files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSpotProperty {
    pub spot_id: usize,
    pub central_chrom: ChromXs,
    pub central_mass: f64,
    pub min_rt: f64,
    pub max_rt: f64,
    /// Only meaningful for drift spots.
    pub min_drift: f64,
    pub max_drift: f64,
    /// Detected slots over all slots, in [0, 1].
    pub fill_percentage: f64,
    pub representative_file_id: usize,
    pub identity: Option<MsScanMatchResult>,
    /// One entry per input file, in file order.
    pub aligned_peaks: Vec<AlignedPeakProperty>,
    pub drift_spots: Vec<AlignmentSpotProperty>,
}

impl AlignmentSpotProperty {
    pub fn num_detected(&self) -> usize {
        self.aligned_peaks.iter().filter(|p| p.is_detected()).count()
    }
}

/// Output of a batch alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlignmentResult {
    /// Names of the aligned files, slot order of every spot.
    pub file_names: Vec<String>,
    pub spots: Vec<AlignmentSpotProperty>,
}
