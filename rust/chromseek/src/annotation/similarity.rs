//! Spectrum to spectrum similarity measures.

use chromquery::SpectrumPeak;
use chromquery::models::MzTolerance;

use crate::models::IsotopeRatios;
use crate::utils::correlation::gaussian_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectrumSimilarity {
    pub weighted_dot_product: f64,
    pub reverse_dot_product: f64,
    /// Fraction (0 - 1) of the reference peaks found in the experimental spectrum.
    pub matched_peaks_percentage: f64,
    pub matched_peaks_count: usize,
}

/// Compares an experimental spectrum against a reference one.
///
/// Every reference peak collects the summed intensity of the experimental
/// peaks within `tolerance` of it. With `m` the matched pairs:
///
/// - weighted dot: `(sum sqrt(Ie * Ir))^2 / (sum Ie_all * sum Ir_all)`
/// - reverse dot: same, but only matched experimental intensities in the
///   denominator, so unexplained experimental peaks are not penalized.
///
/// Both spectra must be sorted by m/z. Empty spectra score 0.
pub fn spectrum_similarity(
    experimental: &[SpectrumPeak],
    reference: &[SpectrumPeak],
    tolerance: &MzTolerance,
) -> SpectrumSimilarity {
    if experimental.is_empty() || reference.is_empty() {
        return SpectrumSimilarity::default();
    }
    let exp_total: f64 = experimental.iter().map(|p| p.intensity).sum();
    let ref_total: f64 = reference.iter().map(|p| p.intensity).sum();
    if !(exp_total > 0.0 && ref_total > 0.0) {
        return SpectrumSimilarity::default();
    }

    let mut cross = 0.0;
    let mut exp_matched = 0.0;
    let mut matched = 0;
    for peak in reference {
        let tol = tolerance.da_at(peak.mz);
        let lo = experimental.partition_point(|p| p.mz < peak.mz - tol);
        let intensity: f64 = experimental[lo..]
            .iter()
            .take_while(|p| p.mz <= peak.mz + tol)
            .map(|p| p.intensity)
            .sum();
        if intensity > 0.0 {
            matched += 1;
            cross += (intensity * peak.intensity).sqrt();
            exp_matched += intensity;
        }
    }
    if matched == 0 {
        return SpectrumSimilarity::default();
    }

    let cross_sq = cross * cross;
    SpectrumSimilarity {
        weighted_dot_product: (cross_sq / (exp_total * ref_total)).min(1.0),
        reverse_dot_product: (cross_sq / (exp_matched * ref_total)).min(1.0),
        matched_peaks_percentage: matched as f64 / reference.len() as f64,
        matched_peaks_count: matched,
    }
}

/// Agreement between observed and theoretical isotope ratios, 1 when equal.
pub fn isotope_similarity(observed: &IsotopeRatios, reference: &IsotopeRatios, tolerance: f64) -> f64 {
    let m1 = gaussian_similarity(observed.m1 - reference.m1, tolerance);
    let m2 = gaussian_similarity(observed.m2 - reference.m2, tolerance);
    0.5 * (m1 + m2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(v: &[(f64, f64)]) -> Vec<SpectrumPeak> {
        v.iter().map(|&(mz, i)| SpectrumPeak::new(mz, i)).collect()
    }

    #[test]
    fn test_identical_spectra() {
        let s = spec(&[(100.0, 10.0), (150.0, 50.0), (200.0, 100.0)]);
        let sim = spectrum_similarity(&s, &s, &MzTolerance::Absolute(0.01));
        assert!((sim.weighted_dot_product - 1.0).abs() < 1e-12);
        assert!((sim.reverse_dot_product - 1.0).abs() < 1e-12);
        assert_eq!(sim.matched_peaks_count, 3);
        assert_eq!(sim.matched_peaks_percentage, 1.0);
    }

    #[test]
    fn test_extra_experimental_peaks_only_hit_forward_dot() {
        let exp = spec(&[(100.0, 10.0), (120.0, 100.0), (150.0, 10.0)]);
        let reference = spec(&[(100.0, 10.0), (150.0, 10.0)]);
        let sim = spectrum_similarity(&exp, &reference, &MzTolerance::Absolute(0.01));
        assert!((sim.reverse_dot_product - 1.0).abs() < 1e-12);
        assert!(sim.weighted_dot_product < 0.2);
    }

    #[test]
    fn test_no_overlap() {
        let exp = spec(&[(100.0, 10.0)]);
        let reference = spec(&[(300.0, 10.0)]);
        let sim = spectrum_similarity(&exp, &reference, &MzTolerance::Absolute(0.01));
        assert_eq!(sim, SpectrumSimilarity::default());
        assert_eq!(spectrum_similarity(&[], &reference, &MzTolerance::Absolute(0.01)), sim);
    }

    #[test]
    fn test_isotope_similarity() {
        let r = IsotopeRatios { m1: 0.1, m2: 0.01 };
        assert_eq!(isotope_similarity(&r, &r, 0.1), 1.0);
        let off = IsotopeRatios { m1: 0.3, m2: 0.01 };
        assert!(isotope_similarity(&off, &r, 0.1) < 0.6);
    }
}
