//! One dimensional peak detection over a (smoothed) trace.
//!
//! The same routine is used for chromatograms (time axis in minutes) and
//! mobilograms (drift axis), the caller supplies the axis values.

use serde::{
    Deserialize,
    Serialize,
};

use super::median;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDetectionParameters {
    pub minimum_amplitude: f64,
    pub minimum_datapoints: usize,
    pub signal_to_noise_threshold: f64,
}

impl Default for PeakDetectionParameters {
    fn default() -> Self {
        Self {
            minimum_amplitude: 500.0,
            minimum_datapoints: 5,
            signal_to_noise_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPeak {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    /// Raw intensity at the top.
    pub height: f64,
    /// Trapezoid area of the raw trace between the boundaries.
    pub area: f64,
    pub signal_to_noise: f64,
    pub noise: f64,
}

impl DetectedPeak {
    pub fn num_datapoints(&self) -> usize {
        self.right - self.left + 1
    }
}

/// Noise level of a trace, median of the non zero absolute point to point
/// differences. Traces without any variation get a noise of 1.0.
pub fn estimate_noise(raw: &[f64]) -> f64 {
    let diffs: Vec<f64> = raw
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|d| *d > 0.0 && d.is_finite())
        .collect();
    match median(&diffs) {
        Some(x) if x > 0.0 => x,
        _ => 1.0,
    }
}

/// Walks downhill from `top` in both directions until a valley or the baseline.
fn resolve_boundaries(smoothed: &[f64], top: usize) -> (usize, usize) {
    let mut left = top;
    while left > 0 && smoothed[left] > 0.0 && smoothed[left - 1] <= smoothed[left] {
        left -= 1;
    }
    let mut right = top;
    while right + 1 < smoothed.len()
        && smoothed[right] > 0.0
        && smoothed[right + 1] <= smoothed[right]
    {
        right += 1;
    }
    (left, right)
}

fn trapezoid_area(times: &[f64], raw: &[f64], left: usize, right: usize) -> f64 {
    (left..right)
        .map(|i| 0.5 * (raw[i] + raw[i + 1]) * (times[i + 1] - times[i]))
        .sum()
}

fn local_maxima(smoothed: &[f64]) -> impl Iterator<Item = usize> + '_ {
    (1..smoothed.len().saturating_sub(1))
        .filter(move |&i| smoothed[i] >= smoothed[i - 1] && smoothed[i] > smoothed[i + 1])
}

fn build_peak(times: &[f64], smoothed: &[f64], raw: &[f64], top: usize, noise: f64) -> DetectedPeak {
    let (left, right) = resolve_boundaries(smoothed, top);
    let height = raw[top];
    DetectedPeak {
        left,
        top,
        right,
        height,
        area: trapezoid_area(times, raw, left, right),
        signal_to_noise: height / noise,
        noise,
    }
}

/// Finds all peaks in a trace.
///
/// `times`, `smoothed` and `raw` must have the same length. Tops are picked on
/// the smoothed trace, heights and areas are measured on the raw one.
/// Peaks are returned in axis order.
pub fn detect_peaks(
    times: &[f64],
    smoothed: &[f64],
    raw: &[f64],
    params: &PeakDetectionParameters,
) -> Vec<DetectedPeak> {
    debug_assert_eq!(times.len(), smoothed.len());
    debug_assert_eq!(times.len(), raw.len());
    if times.len() < 3 || smoothed.len() != times.len() || raw.len() != times.len() {
        return Vec::new();
    }
    let noise = estimate_noise(raw);

    local_maxima(smoothed)
        .filter(|&i| smoothed[i] >= params.minimum_amplitude)
        .map(|i| build_peak(times, smoothed, raw, i, noise))
        .filter(|p| p.num_datapoints() >= params.minimum_datapoints)
        .filter(|p| p.signal_to_noise >= params.signal_to_noise_threshold)
        .collect()
}

/// Peak whose top is closest to `target` on the axis, without any filtering.
///
/// Monotonic traces have no local maximum, in that case the highest point
/// is used as the top. Returns `None` for empty input.
pub fn peak_nearest(times: &[f64], smoothed: &[f64], raw: &[f64], target: f64) -> Option<DetectedPeak> {
    if times.is_empty() || smoothed.len() != times.len() || raw.len() != times.len() {
        return None;
    }
    let noise = estimate_noise(raw);
    let nearest = local_maxima(smoothed).min_by(|&a, &b| {
        (times[a] - target)
            .abs()
            .total_cmp(&(times[b] - target).abs())
            .then(a.cmp(&b))
    });
    let top = match nearest {
        Some(top) => top,
        None => smoothed
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)?,
    };
    Some(build_peak(times, smoothed, raw, top, noise))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_trace(n: usize, center: f64, sigma: f64, height: f64) -> (Vec<f64>, Vec<f64>) {
        let times: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let values = times
            .iter()
            .map(|t| height * (-0.5 * ((t - center) / sigma).powi(2)).exp())
            .collect();
        (times, values)
    }

    #[test]
    fn test_single_gaussian() {
        let (times, values) = gaussian_trace(200, 1.0, 0.05, 1e4);
        let params = PeakDetectionParameters::default();
        let peaks = detect_peaks(&times, &values, &values, &params);
        assert_eq!(peaks.len(), 1);
        let p = peaks[0];
        assert_eq!(p.top, 100);
        assert!((p.height - 1e4).abs() < 1e-6);
        // Area of a gaussian is h * sigma * sqrt(2 * pi)
        let expect = 1e4 * 0.05 * (2.0 * std::f64::consts::PI).sqrt();
        assert!((p.area - expect).abs() / expect < 0.01, "{} vs {}", p.area, expect);
        assert!(p.left < 90 && p.right > 110);
    }

    #[test]
    fn test_two_peaks_split_at_valley() {
        let (times, a) = gaussian_trace(300, 1.0, 0.05, 1e4);
        let (_, b) = gaussian_trace(300, 2.0, 0.05, 5e3);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        let peaks = detect_peaks(&times, &values, &values, &PeakDetectionParameters::default());
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].top, 100);
        assert_eq!(peaks[1].top, 200);
        assert!(peaks[0].right <= peaks[1].left);
    }

    #[test]
    fn test_filters() {
        let (times, values) = gaussian_trace(200, 1.0, 0.05, 300.0);
        let peaks = detect_peaks(&times, &values, &values, &PeakDetectionParameters::default());
        assert!(peaks.is_empty());

        let zeros = vec![0.0; 200];
        assert!(detect_peaks(&times, &zeros, &zeros, &PeakDetectionParameters::default()).is_empty());
        assert_eq!(estimate_noise(&zeros), 1.0);
    }

    #[test]
    fn test_peak_nearest() {
        let (times, a) = gaussian_trace(300, 1.0, 0.05, 1e4);
        let (_, b) = gaussian_trace(300, 2.0, 0.05, 5e3);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        let p = peak_nearest(&times, &values, &values, 1.8).unwrap();
        assert_eq!(p.top, 200);

        let flat = vec![0.0; 10];
        let p = peak_nearest(&times[..10], &flat, &flat, 0.05).unwrap();
        assert_eq!(p.height, 0.0);
        assert_eq!(p.area, 0.0);
        assert!(peak_nearest(&[], &[], &[], 1.0).is_none());
    }
}
