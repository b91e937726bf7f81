use crate::models::spectrum::RawSpectrum;
use crate::utils::smoothing::{
    SmoothingMethod,
    smooth,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromatogramPoint {
    /// Position of the scan in the data provider.
    pub scan_position: usize,
    /// Axis value, retention time in minutes or drift time.
    pub time: f64,
    /// m/z of the peak the intensity came from (the query center when absent).
    pub mz: f64,
    pub intensity: f64,
}

/// An extracted trace over the retention time (or drift) axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chromatogram {
    pub points: Vec<ChromatogramPoint>,
}

impl Chromatogram {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    pub fn smoothed_intensities(&self, method: SmoothingMethod, level: usize) -> Vec<f64> {
        smooth(&self.intensities(), method, level)
    }

    pub fn max_intensity(&self) -> f64 {
        self.points.iter().map(|p| p.intensity).fold(0.0, f64::max)
    }

    /// Intensity weighted mean m/z of the points `[center - 1, center + 1]`.
    ///
    /// Falls back to the m/z at `center` when all the intensities are zero.
    pub fn weighted_mz_around(&self, center: usize) -> f64 {
        let lo = center.saturating_sub(1);
        let hi = (center + 1).min(self.points.len().saturating_sub(1));
        let (num, den) = self.points[lo..=hi]
            .iter()
            .filter(|p| p.intensity > 0.0)
            .fold((0.0, 0.0), |(n, d), p| (n + p.mz * p.intensity, d + p.intensity));
        if den > 0.0 {
            num / den
        } else {
            self.points[center].mz
        }
    }
}

/// Extracted ion chromatogram between `lo` and `hi` m/z.
///
/// One point per scan, the most intense peak in the window (zero when the
/// scan has nothing in it). `scans` yields `(position, spectrum)` pairs in
/// retention time order.
pub fn extract_eic<'a>(
    scans: impl IntoIterator<Item = (usize, &'a RawSpectrum)>,
    lo: f64,
    hi: f64,
) -> Chromatogram {
    let center = 0.5 * (lo + hi);
    let points = scans
        .into_iter()
        .map(|(pos, scan)| {
            let (mz, intensity) = match scan.max_peak_in(lo, hi) {
                Some(p) => (p.mz, p.intensity),
                None => (center, 0.0),
            };
            ChromatogramPoint {
                scan_position: pos,
                time: scan.rt_minutes,
                mz,
                intensity,
            }
        })
        .collect();
    Chromatogram { points }
}

/// Collapses consecutive points that share the same axis value.
///
/// Intensities are summed, the m/z and scan position come from the most
/// intense contributor. Input has to be sorted by `time`.
pub fn merge_equal_times(points: Vec<ChromatogramPoint>) -> Vec<ChromatogramPoint> {
    let mut merged: Vec<(ChromatogramPoint, f64)> = Vec::with_capacity(points.len());
    for point in points {
        match merged.last_mut() {
            Some((last, best)) if last.time == point.time => {
                last.intensity += point.intensity;
                if point.intensity > *best {
                    *best = point.intensity;
                    last.scan_position = point.scan_position;
                    last.mz = point.mz;
                }
            }
            _ => merged.push((point, point.intensity)),
        }
    }
    merged.into_iter().map(|(p, _)| p).collect()
}

/// Trace over the drift axis between `lo` and `hi` m/z.
///
/// Scans without a drift time are skipped, scans that share a drift time are
/// summed. The resulting points are ordered by drift time.
pub fn extract_mobilogram<'a>(
    scans: impl IntoIterator<Item = (usize, &'a RawSpectrum)>,
    lo: f64,
    hi: f64,
) -> Chromatogram {
    let center = 0.5 * (lo + hi);
    let mut points: Vec<ChromatogramPoint> = scans
        .into_iter()
        .filter_map(|(pos, scan)| {
            let drift = scan.drift_time?;
            let (mz, intensity) = match scan.max_peak_in(lo, hi) {
                Some(p) => (p.mz, p.intensity),
                None => (center, 0.0),
            };
            Some(ChromatogramPoint {
                scan_position: pos,
                time: drift,
                mz,
                intensity,
            })
        })
        .collect();
    points.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then(a.scan_position.cmp(&b.scan_position))
    });

    Chromatogram {
        points: merge_equal_times(points),
    }
}
