use std::ops::Range;
use std::sync::Arc;

use crate::models::chromatogram::{
    Chromatogram,
    extract_eic,
    extract_mobilogram,
    merge_equal_times,
};
use crate::models::spectrum::RawSpectrum;
use crate::utils::binary_search_range_by_key;

/// Read only access to the scans of one acquisition.
///
/// Implementors only need to hand out the scans, sorted by retention time
/// (ties by scan index). Everything else is derived from that ordering.
///
/// The provider is shared between worker threads, hence the `Send + Sync`
/// bound; queries never mutate it.
pub trait DataProvider: Send + Sync {
    fn spectra(&self) -> &[RawSpectrum];

    fn num_spectra(&self) -> usize {
        self.spectra().len()
    }

    fn spectrum(&self, position: usize) -> Option<&RawSpectrum> {
        self.spectra().get(position)
    }

    /// Positions of the scans with `lo <= rt <= hi`.
    fn rt_positions(&self, lo: f64, hi: f64) -> Range<usize> {
        binary_search_range_by_key(self.spectra(), lo, hi, |s| s.rt_minutes)
    }

    /// Positions of the scans of a given MS level inside the RT range.
    fn positions_by_level(&self, lo: f64, hi: f64, ms_level: u8) -> Vec<usize> {
        let spectra = self.spectra();
        self.rt_positions(lo, hi)
            .filter(|&i| spectra[i].ms_level == ms_level)
            .collect()
    }

    /// MS2 scans inside the RT range whose precursor is within `tol` of
    /// `precursor_mz`, or within the isolation window of the scan when that
    /// is wider.
    fn ms2_positions_for_precursor(&self, lo: f64, hi: f64, precursor_mz: f64, tol: f64) -> Vec<usize> {
        let spectra = self.spectra();
        self.rt_positions(lo, hi)
            .filter(|&i| {
                let s = &spectra[i];
                s.ms_level == 2
                    && s.precursor.as_ref().is_some_and(|p| {
                        let window = tol.max(p.isolation_half_width.unwrap_or(0.0));
                        (p.mz - precursor_mz).abs() <= window
                    })
            })
            .collect()
    }

    fn has_drift_times(&self) -> bool {
        self.spectra().iter().any(|s| s.drift_time.is_some())
    }

    /// MS1 extracted ion chromatogram.
    ///
    /// Scans that share a retention time (mobility separated frames) are
    /// summed into one point.
    fn ms1_eic(&self, rt_lo: f64, rt_hi: f64, mz_lo: f64, mz_hi: f64) -> Chromatogram {
        let spectra = self.spectra();
        let positions = self.positions_by_level(rt_lo, rt_hi, 1);
        let eic = extract_eic(positions.iter().map(|&i| (i, &spectra[i])), mz_lo, mz_hi);
        Chromatogram {
            points: merge_equal_times(eic.points),
        }
    }

    /// MS1 mobilogram of the scans between `rt_lo` and `rt_hi`.
    fn ms1_mobilogram(&self, rt_lo: f64, rt_hi: f64, mz_lo: f64, mz_hi: f64) -> Chromatogram {
        let spectra = self.spectra();
        let positions = self.positions_by_level(rt_lo, rt_hi, 1);
        extract_mobilogram(positions.iter().map(|&i| (i, &spectra[i])), mz_lo, mz_hi)
    }
}

/// Scans held in memory, the usual provider.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataProvider {
    spectra: Vec<RawSpectrum>,
}

impl InMemoryDataProvider {
    /// Sorts the scans by retention time (then index).
    pub fn new(mut spectra: Vec<RawSpectrum>) -> Self {
        spectra.sort_by(|a, b| {
            a.rt_minutes
                .total_cmp(&b.rt_minutes)
                .then(a.index.cmp(&b.index))
        });
        Self { spectra }
    }
}

impl DataProvider for InMemoryDataProvider {
    fn spectra(&self) -> &[RawSpectrum] {
        &self.spectra
    }
}

impl<T: DataProvider + ?Sized> DataProvider for Arc<T> {
    fn spectra(&self) -> &[RawSpectrum] {
        (**self).spectra()
    }
}
