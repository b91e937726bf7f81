use chromquery::utils::median;
use chromquery::utils::streaming_calculators::RunningStatsCalculator;
use serde::{
    Deserialize,
    Serialize,
};

use crate::models::ChromatogramPeakFeature;

/// Per file statistics of the detected features.
///
/// Widths are measured on the main chromatographic axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ChromatogramPeaksDataSummary {
    pub count: usize,
    pub min_rt: f64,
    pub max_rt: f64,
    pub min_mass: f64,
    pub max_mass: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub mean_width: f64,
    pub median_width: f64,
    pub stdev_width: f64,
}

impl ChromatogramPeaksDataSummary {
    /// Empty input gives the all zero summary.
    pub fn from_features(features: &[ChromatogramPeakFeature]) -> Self {
        if features.is_empty() {
            return Self::default();
        }
        let mut width_stats = RunningStatsCalculator::default();
        let mut rt_stats = RunningStatsCalculator::default();
        let mut mass_stats = RunningStatsCalculator::default();
        let mut height_stats = RunningStatsCalculator::default();
        let mut widths = Vec::with_capacity(features.len());

        for f in features {
            let w = f.peak_width();
            widths.push(w);
            width_stats.add(1.0, w);
            rt_stats.add(1.0, f.chrom_top.rt);
            mass_stats.add(1.0, f.accurate_mass);
            height_stats.add(1.0, f.height);
        }

        Self {
            count: features.len(),
            min_rt: rt_stats.min().unwrap_or(0.0),
            max_rt: rt_stats.max().unwrap_or(0.0),
            min_mass: mass_stats.min().unwrap_or(0.0),
            max_mass: mass_stats.max().unwrap_or(0.0),
            min_height: height_stats.min().unwrap_or(0.0),
            max_height: height_stats.max().unwrap_or(0.0),
            mean_width: width_stats.mean().unwrap_or(0.0),
            median_width: median(&widths).unwrap_or(0.0),
            stdev_width: width_stats.standard_deviation().unwrap_or(0.0),
        }
    }

    /// RT window used for MS2 deconvolution of a feature of the given width,
    /// centered on the feature top.
    ///
    /// The width is clamped to `[median, max(median, mean + 3 * stdev)]`;
    /// with an empty summary the width itself is used.
    pub fn deconvolution_window(&self, width: f64) -> f64 {
        if self.count == 0 {
            return width;
        }
        let lo = self.median_width;
        let hi = (self.mean_width + 3.0 * self.stdev_width).max(lo);
        width.clamp(lo, hi)
    }
}
