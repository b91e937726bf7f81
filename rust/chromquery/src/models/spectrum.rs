use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::UnsupportedDataError;
use crate::utils::binary_search_range_by_key;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SpectrumPeak {
    pub mz: f64,
    pub intensity: f64,
}

impl SpectrumPeak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self { mz, intensity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecursorInfo {
    pub mz: f64,
    #[serde(default)]
    pub collision_energy: Option<f64>,
    #[serde(default)]
    pub isolation_half_width: Option<f64>,
}

/// A single scan as read from the raw data.
///
/// Peaks are sorted ascending by m/z, the readers enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpectrum {
    pub index: usize,
    pub rt_minutes: f64,
    #[serde(default)]
    pub drift_time: Option<f64>,
    pub ms_level: u8,
    #[serde(default)]
    pub precursor: Option<PrecursorInfo>,
    #[serde(default)]
    pub peaks: Vec<SpectrumPeak>,
}

impl RawSpectrum {
    pub fn check_sorted(&self) -> Result<(), UnsupportedDataError> {
        if self.peaks.windows(2).all(|w| w[0].mz <= w[1].mz) {
            Ok(())
        } else {
            Err(UnsupportedDataError::UnsortedPeaks {
                scan_index: self.index,
            })
        }
    }

    /// Peaks with `lo <= mz <= hi`.
    pub fn peaks_in(&self, lo: f64, hi: f64) -> &[SpectrumPeak] {
        let range = binary_search_range_by_key(&self.peaks, lo, hi, |p| p.mz);
        &self.peaks[range]
    }

    /// Most intense peak with `lo <= mz <= hi`, ties go to the lower m/z.
    pub fn max_peak_in(&self, lo: f64, hi: f64) -> Option<SpectrumPeak> {
        self.peaks_in(lo, hi).iter().copied().fold(None, |best, p| match best {
            Some(b) if b.intensity >= p.intensity => Some(b),
            _ => Some(p),
        })
    }

    pub fn base_peak_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).fold(0.0, f64::max)
    }

    pub fn total_ion_current(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    pub fn precursor_mz(&self) -> Option<f64> {
        self.precursor.map(|p| p.mz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChromXType {
    #[default]
    Rt,
    Ri,
    Drift,
}

/// Chromatographic coordinates of a point.
///
/// RT is in minutes, `main` tells which of the axes the point was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ChromXs {
    pub rt: f64,
    pub ri: f64,
    pub drift: f64,
    pub main: ChromXType,
}

impl ChromXs {
    pub fn from_rt(rt: f64) -> Self {
        Self {
            rt,
            ..Default::default()
        }
    }

    pub fn from_drift(rt: f64, drift: f64) -> Self {
        Self {
            rt,
            ri: 0.0,
            drift,
            main: ChromXType::Drift,
        }
    }

    /// Value on the main axis.
    pub fn value(&self) -> f64 {
        match self.main {
            ChromXType::Rt => self.rt,
            ChromXType::Ri => self.ri,
            ChromXType::Drift => self.drift,
        }
    }
}
