//! Parameters of every processing stage.
//!
//! All of them deserialize with defaults, so a config only needs to carry
//! the values it wants to change.

use chromquery::models::MzTolerance;
use chromquery::utils::peak_detection::PeakDetectionParameters;
use chromquery::utils::smoothing::SmoothingMethod;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IonizationMode {
    #[default]
    Positive,
    Negative,
}

impl IonizationMode {
    pub fn default_adduct(&self) -> &'static str {
        match self {
            IonizationMode::Positive => "[M+H]+",
            IonizationMode::Negative => "[M-H]-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TargetOmics {
    #[default]
    Metabolomics,
    Lipidomics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakPickingParameter {
    pub rt_begin: f64,
    pub rt_end: f64,
    pub mass_range_begin: f64,
    pub mass_range_end: f64,
    pub mass_slice_width: f64,
    pub smoothing_method: SmoothingMethod,
    pub smoothing_level: usize,
    pub detection: PeakDetectionParameters,
    pub ms1_tolerance: MzTolerance,
    /// MS2 scans are linked when their precursor is within this many Da
    /// (or within their isolation window when that is wider).
    pub ms2_precursor_tolerance: f64,
    pub isotope_rt_tolerance: f64,
    pub max_isotope_charge: u8,
    pub ionization_mode: IonizationMode,
    pub drift_minimum_datapoints: usize,
}

impl Default for PeakPickingParameter {
    fn default() -> Self {
        Self {
            rt_begin: 0.0,
            rt_end: 100.0,
            mass_range_begin: 0.0,
            mass_range_end: 2000.0,
            mass_slice_width: 0.1,
            smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 3,
            detection: PeakDetectionParameters::default(),
            ms1_tolerance: MzTolerance::Scaled(0.01),
            ms2_precursor_tolerance: 0.01,
            isotope_rt_tolerance: 0.03,
            max_isotope_charge: 2,
            ionization_mode: IonizationMode::Positive,
            drift_minimum_datapoints: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionParameter {
    pub centroid_ms2_tolerance: f64,
    pub amplitude_cutoff: f64,
    /// Percent of the base peak.
    pub relative_amplitude_cutoff: f64,
    pub remove_after_precursor: bool,
    pub kept_isotope_range: f64,
    pub keep_original_precursor_isotopes: bool,
    pub correlation_threshold: f64,
    pub ms2_tolerance: MzTolerance,
    /// Tolerance used to decide that two MS2 scans share a precursor.
    pub same_precursor_tolerance: f64,
    pub smoothing_method: SmoothingMethod,
    pub smoothing_level: usize,
    pub minimum_scans: usize,
}

impl Default for DeconvolutionParameter {
    fn default() -> Self {
        Self {
            centroid_ms2_tolerance: 0.01,
            amplitude_cutoff: 0.0,
            relative_amplitude_cutoff: 0.0,
            remove_after_precursor: true,
            kept_isotope_range: 5.0,
            keep_original_precursor_isotopes: false,
            correlation_threshold: 0.8,
            ms2_tolerance: MzTolerance::Scaled(0.025),
            same_precursor_tolerance: 0.01,
            smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 1,
            minimum_scans: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationParameter {
    pub target_omics: TargetOmics,
    pub ms1_tolerance: MzTolerance,
    pub ms2_tolerance: MzTolerance,
    pub rt_tolerance: f64,
    pub use_rt_for_scoring: bool,
    pub use_rt_for_filtering: bool,
    pub weighted_dot_product_cutoff: f64,
    pub reverse_dot_product_cutoff: f64,
    pub matched_peaks_percentage_cutoff: f64,
    pub minimum_matched_peaks: usize,
    pub identification_score_cutoff: f64,
    /// Tolerance on the absolute difference of isotope ratios.
    pub isotope_ratio_tolerance: f64,
}

impl Default for AnnotationParameter {
    fn default() -> Self {
        Self {
            target_omics: TargetOmics::Metabolomics,
            ms1_tolerance: MzTolerance::Scaled(0.01),
            ms2_tolerance: MzTolerance::Scaled(0.025),
            rt_tolerance: 0.5,
            use_rt_for_scoring: false,
            use_rt_for_filtering: false,
            weighted_dot_product_cutoff: 0.5,
            reverse_dot_product_cutoff: 0.5,
            matched_peaks_percentage_cutoff: 0.0,
            minimum_matched_peaks: 1,
            identification_score_cutoff: 0.2,
            isotope_ratio_tolerance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParameter {
    pub rt_tolerance: f64,
    pub mass_tolerance: f64,
    pub drift_tolerance: f64,
    pub reference_file_index: usize,
    pub enable_gap_filling: bool,
    pub gap_fill_mass_tolerance: f64,
    pub gap_fill_smoothing_method: SmoothingMethod,
    pub gap_fill_smoothing_level: usize,
}

impl Default for AlignmentParameter {
    fn default() -> Self {
        Self {
            rt_tolerance: 0.1,
            mass_tolerance: 0.015,
            drift_tolerance: 0.02,
            reference_file_index: 0,
            enable_gap_filling: true,
            gap_fill_mass_tolerance: 0.01,
            gap_fill_smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            gap_fill_smoothing_level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProcessingParameters {
    pub peak_picking: PeakPickingParameter,
    pub deconvolution: DeconvolutionParameter,
    pub annotation: AnnotationParameter,
    pub alignment: AlignmentParameter,
    /// 0 lets rayon decide.
    pub num_threads: usize,
}
