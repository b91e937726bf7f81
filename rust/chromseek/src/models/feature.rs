use chromquery::ChromXs;
use serde::{
    Deserialize,
    Serialize,
};

use super::match_result::MsScanMatchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsotopeCharacter {
    /// 0 for the monoisotopic peak, `k` for the M+k isotope.
    pub weight_number: u32,
    /// Peak id of the monoisotopic feature (its own id when monoisotopic).
    pub parent_peak_id: usize,
    pub charge: u8,
}

impl IsotopeCharacter {
    pub fn monoisotopic(peak_id: usize) -> Self {
        Self {
            weight_number: 0,
            parent_peak_id: peak_id,
            charge: 1,
        }
    }

    pub fn is_monoisotopic(&self) -> bool {
        self.weight_number == 0
    }
}

/// A peak detected in retention time (or drift) x mass space in one file.
///
/// Scan fields are positions in the file's data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromatogramPeakFeature {
    pub peak_id: usize,
    pub chrom_top: ChromXs,
    pub chrom_left: ChromXs,
    pub chrom_right: ChromXs,
    pub scan_top: usize,
    pub scan_left: usize,
    pub scan_right: usize,
    pub accurate_mass: f64,
    pub height: f64,
    pub area: f64,
    pub signal_to_noise: f64,
    pub estimated_noise: f64,
    pub isotope: IsotopeCharacter,
    pub adduct: String,
    /// Representative MS2 scan, the one closest to the top.
    pub ms2_raw_scan: Option<usize>,
    pub ms2_scans: Vec<usize>,
    pub drift_features: Vec<ChromatogramPeakFeature>,
    pub primary_identity: Option<MsScanMatchResult>,
    pub alignment_id: Option<usize>,
}

impl ChromatogramPeakFeature {
    /// Width on the main chromatographic axis.
    pub fn peak_width(&self) -> f64 {
        self.chrom_right.value() - self.chrom_left.value()
    }
}
