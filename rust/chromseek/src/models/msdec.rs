use chromquery::{
    ChromXs,
    SpectrumPeak,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelChromatogramPoint {
    pub rt: f64,
    pub intensity: f64,
}

/// Deconvoluted MS2 spectrum of one feature.
///
/// Lists of results are kept parallel (same length and order) to the
/// feature list they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MsDecResult {
    /// Peak id of the feature.
    pub scan_id: usize,
    /// Provider position of the MS2 scan used, `None` when there was none.
    pub raw_spectrum_id: Option<usize>,
    pub chrom: ChromXs,
    pub precursor_mz: f64,
    pub model_peak_mz: f64,
    pub model_peak_height: f64,
    pub model_peak_area: f64,
    /// Fraction of the total fragment intensity at the model apex that the
    /// kept fragments explain, 0 when no model could be built.
    pub model_peak_purity: f64,
    pub model_masses: Vec<f64>,
    pub model_chromatogram: Vec<ModelChromatogramPoint>,
    pub spectrum: Vec<SpectrumPeak>,
}

impl MsDecResult {
    pub fn has_model(&self) -> bool {
        !self.model_masses.is_empty()
    }
}
