//! 3-D peak spotting: retention time x mass x intensity.
//!
//! The mass axis is cut into half overlapping slices, one extracted ion
//! chromatogram is built per occupied slice and 1-D peak detection runs on
//! each of them. Slices are processed in parallel into private buffers, the
//! merge (and deduplication of peaks seen by two overlapping slices) is
//! sequential.

use chromquery::models::{
    ChromXs,
    Chromatogram,
    ChromatogramPoint,
    extract_eic,
    merge_equal_times,
};
use chromquery::utils::binary_search_range_by_key;
use chromquery::utils::peak_detection::{
    DetectedPeak,
    PeakDetectionParameters,
    detect_peaks,
};
use chromquery::utils::smoothing::smooth;
use chromquery::DataProvider;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

use super::isotopes::assign_isotopes;
use crate::models::{
    ChromatogramPeakFeature,
    IsotopeCharacter,
};
use crate::parameters::PeakPickingParameter;
use crate::pipeline::context::{
    ProcessingStage,
    RunContext,
};

/// Maximum distance, in MS1 scans, between the tops of two duplicated peaks.
const DUPLICATE_TOP_SCAN_DISTANCE: usize = 2;

#[derive(Debug, Clone, Copy)]
struct PeakCandidate {
    /// Indices into the (shared) MS1 time axis.
    left: usize,
    top: usize,
    right: usize,
    mass: f64,
    height: f64,
    area: f64,
    signal_to_noise: f64,
    noise: f64,
}

/// Mass slices of the run.
#[derive(Debug, Clone, Copy)]
struct MassSlicing {
    begin: f64,
    end: f64,
    width: f64,
    step: f64,
}

impl MassSlicing {
    fn new(params: &PeakPickingParameter) -> Option<Self> {
        let width = params.mass_slice_width;
        if !(width > 0.0) || !(params.mass_range_end > params.mass_range_begin) {
            return None;
        }
        Some(Self {
            begin: params.mass_range_begin,
            end: params.mass_range_end,
            width,
            step: width / 2.0,
        })
    }

    fn bounds(&self, bin: usize) -> (f64, f64) {
        let lo = self.begin + bin as f64 * self.step;
        (lo, lo + self.width)
    }

    /// Slices that contain `mz`.
    fn bins_of(&self, mz: f64) -> impl Iterator<Item = usize> {
        let first = ((mz - self.begin - self.width) / self.step).ceil().max(0.0) as usize;
        let last = ((mz - self.begin) / self.step).floor().max(0.0) as usize;
        first..=last
    }
}

/// Slices holding at least one MS1 centroid inside the mass range.
fn occupied_bins<P: DataProvider + ?Sized>(
    provider: &P,
    ms1: &[usize],
    slicing: &MassSlicing,
) -> Vec<usize> {
    let spectra = provider.spectra();
    let mut bins = BTreeSet::new();
    for &pos in ms1 {
        for peak in spectra[pos].peaks_in(slicing.begin, slicing.end) {
            for bin in slicing.bins_of(peak.mz) {
                let (lo, hi) = slicing.bounds(bin);
                if lo <= peak.mz && peak.mz <= hi {
                    bins.insert(bin);
                }
            }
        }
    }
    bins.into_iter().collect()
}

fn ms1_trace<P: DataProvider + ?Sized>(provider: &P, ms1: &[usize], lo: f64, hi: f64) -> Chromatogram {
    let spectra = provider.spectra();
    let eic = extract_eic(ms1.iter().map(|&i| (i, &spectra[i])), lo, hi);
    Chromatogram {
        points: merge_equal_times(eic.points),
    }
}

/// Shared time axis, every slice trace has exactly these points.
fn time_axis<P: DataProvider + ?Sized>(provider: &P, ms1: &[usize]) -> Chromatogram {
    let spectra = provider.spectra();
    let points = ms1
        .iter()
        .map(|&i| ChromatogramPoint {
            scan_position: i,
            time: spectra[i].rt_minutes,
            mz: 0.0,
            intensity: 0.0,
        })
        .collect();
    Chromatogram {
        points: merge_equal_times(points),
    }
}

fn detect_in_trace(
    trace: &Chromatogram,
    params: &PeakPickingParameter,
    detection: &PeakDetectionParameters,
) -> Vec<(DetectedPeak, f64)> {
    if trace.len() < 3 || trace.max_intensity() < detection.minimum_amplitude {
        return Vec::new();
    }
    let times = trace.times();
    let raw = trace.intensities();
    let smoothed = smooth(&raw, params.smoothing_method, params.smoothing_level);
    detect_peaks(&times, &smoothed, &raw, detection)
        .into_iter()
        .map(|p| (p, trace.weighted_mz_around(p.top)))
        .collect()
}

fn spot_bin<P: DataProvider + ?Sized>(
    provider: &P,
    ms1: &[usize],
    slicing: &MassSlicing,
    bin: usize,
    params: &PeakPickingParameter,
) -> Vec<PeakCandidate> {
    let (lo, hi) = slicing.bounds(bin);
    let trace = ms1_trace(provider, ms1, lo, hi);
    detect_in_trace(&trace, params, &params.detection)
        .into_iter()
        .map(|(p, mass)| PeakCandidate {
            left: p.left,
            top: p.top,
            right: p.right,
            mass,
            height: p.height,
            area: p.area,
            signal_to_noise: p.signal_to_noise,
            noise: p.noise,
        })
        .collect()
}

/// Keeps the tallest of every group of candidates with tops at most
/// [`DUPLICATE_TOP_SCAN_DISTANCE`] scans apart and masses within half a slice.
fn deduplicate(mut candidates: Vec<PeakCandidate>, mass_window: f64) -> Vec<PeakCandidate> {
    candidates.sort_by(|a, b| {
        b.height
            .total_cmp(&a.height)
            .then(a.mass.total_cmp(&b.mass))
            .then(a.top.cmp(&b.top))
    });
    // Kept candidates, sorted by mass.
    let mut kept: Vec<PeakCandidate> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let range = binary_search_range_by_key(
            &kept,
            cand.mass - mass_window,
            cand.mass + mass_window,
            |c| c.mass,
        );
        let duplicated = kept[range]
            .iter()
            .any(|k| k.top.abs_diff(cand.top) <= DUPLICATE_TOP_SCAN_DISTANCE);
        if !duplicated {
            let at = kept.partition_point(|k| k.mass < cand.mass);
            kept.insert(at, cand);
        }
    }
    kept
}

/// MS2 scans whose precursor matches the feature inside its RT boundaries.
///
/// Returns all of them plus the one closest to the top.
fn link_ms2<P: DataProvider + ?Sized>(
    provider: &P,
    mass: f64,
    rt_range: (f64, f64),
    rt_top: f64,
    drift_range: Option<(f64, f64)>,
    tolerance: f64,
) -> (Vec<usize>, Option<usize>) {
    let spectra = provider.spectra();
    let scans: Vec<usize> = provider
        .ms2_positions_for_precursor(rt_range.0, rt_range.1, mass, tolerance)
        .into_iter()
        .filter(|&i| match drift_range {
            Some((lo, hi)) => spectra[i].drift_time.is_some_and(|d| lo <= d && d <= hi),
            None => true,
        })
        .collect();
    let representative = scans.iter().copied().min_by(|&a, &b| {
        (spectra[a].rt_minutes - rt_top)
            .abs()
            .total_cmp(&(spectra[b].rt_minutes - rt_top).abs())
            .then(a.cmp(&b))
    });
    (scans, representative)
}

fn build_feature(
    peak_id: usize,
    cand: &PeakCandidate,
    axis: &Chromatogram,
    adduct: &str,
) -> ChromatogramPeakFeature {
    let point = |i: usize| axis.points[i];
    ChromatogramPeakFeature {
        peak_id,
        chrom_top: ChromXs::from_rt(point(cand.top).time),
        chrom_left: ChromXs::from_rt(point(cand.left).time),
        chrom_right: ChromXs::from_rt(point(cand.right).time),
        scan_top: point(cand.top).scan_position,
        scan_left: point(cand.left).scan_position,
        scan_right: point(cand.right).scan_position,
        accurate_mass: cand.mass,
        height: cand.height,
        area: cand.area,
        signal_to_noise: cand.signal_to_noise,
        estimated_noise: cand.noise,
        isotope: IsotopeCharacter::monoisotopic(peak_id),
        adduct: adduct.to_string(),
        ms2_raw_scan: None,
        ms2_scans: Vec::new(),
        drift_features: Vec::new(),
        primary_identity: None,
        alignment_id: None,
    }
}

/// Detects the drift separated features at the top of an RT feature.
fn spot_drift_features<P: DataProvider + ?Sized>(
    provider: &P,
    feature: &ChromatogramPeakFeature,
    rt_window: (f64, f64),
    params: &PeakPickingParameter,
) -> Vec<ChromatogramPeakFeature> {
    let tol = params.ms1_tolerance.da_at(feature.accurate_mass);
    let mobilogram = provider.ms1_mobilogram(
        rt_window.0,
        rt_window.1,
        feature.accurate_mass - tol,
        feature.accurate_mass + tol,
    );
    let detection = PeakDetectionParameters {
        minimum_datapoints: params.drift_minimum_datapoints,
        ..params.detection
    };
    detect_in_trace(&mobilogram, params, &detection)
        .into_iter()
        .enumerate()
        .map(|(i, (p, mass))| {
            let point = |j: usize| mobilogram.points[j];
            let rt = feature.chrom_top.rt;
            let drift_range = (point(p.left).time, point(p.right).time);
            let (ms2_scans, ms2_raw_scan) = link_ms2(
                provider,
                mass,
                rt_window,
                rt,
                Some(drift_range),
                params.ms2_precursor_tolerance,
            );
            ChromatogramPeakFeature {
                peak_id: i,
                chrom_top: ChromXs::from_drift(rt, point(p.top).time),
                chrom_left: ChromXs::from_drift(rt, drift_range.0),
                chrom_right: ChromXs::from_drift(rt, drift_range.1),
                scan_top: point(p.top).scan_position,
                scan_left: point(p.left).scan_position,
                scan_right: point(p.right).scan_position,
                accurate_mass: mass,
                height: p.height,
                area: p.area,
                signal_to_noise: p.signal_to_noise,
                estimated_noise: p.noise,
                isotope: IsotopeCharacter::monoisotopic(i),
                adduct: feature.adduct.clone(),
                ms2_raw_scan,
                ms2_scans,
                drift_features: Vec::new(),
                primary_identity: None,
                alignment_id: None,
            }
        })
        .collect()
}

/// Finds the features of one file.
///
/// Returns `None` if the run was cancelled, an empty list when nothing
/// qualifies (no MS1 scans in the window included). Features are sorted by
/// top RT then mass and numbered from 0.
#[tracing::instrument(skip_all, level = "debug")]
pub fn spot_peaks<P: DataProvider + ?Sized>(
    provider: &P,
    params: &PeakPickingParameter,
    ctx: &RunContext,
) -> Option<Vec<ChromatogramPeakFeature>> {
    let start = Instant::now();
    let ms1 = provider.positions_by_level(params.rt_begin, params.rt_end, 1);
    let slicing = match MassSlicing::new(params) {
        Some(x) => x,
        None => return Some(Vec::new()),
    };
    if ms1.is_empty() {
        debug!("No MS1 scans between {} and {} min", params.rt_begin, params.rt_end);
        return Some(Vec::new());
    }

    let axis = time_axis(provider, &ms1);
    let bins = occupied_bins(provider, &ms1, &slicing);
    debug!("{} occupied mass slices over {} MS1 frames", bins.len(), axis.len());

    let counter = ctx.counter(ProcessingStage::PeakSpotting, bins.len());
    let candidates: Vec<PeakCandidate> = bins
        .par_iter()
        .fold(Vec::new, |mut acc, &bin| {
            if ctx.is_cancelled() {
                return acc;
            }
            acc.extend(spot_bin(provider, &ms1, &slicing, bin, params));
            counter.tick();
            acc
        })
        .reduce(Vec::new, |mut a, b| {
            a.extend(b);
            a
        });
    if ctx.is_cancelled() {
        return None;
    }

    let num_candidates = candidates.len();
    let mut kept = deduplicate(candidates, slicing.width / 2.0);
    kept.sort_by(|a, b| {
        axis.points[a.top]
            .time
            .total_cmp(&axis.points[b.top].time)
            .then(a.mass.total_cmp(&b.mass))
    });

    let adduct = params.ionization_mode.default_adduct();
    let mut features: Vec<ChromatogramPeakFeature> = kept
        .iter()
        .enumerate()
        .map(|(i, c)| build_feature(i, c, &axis, adduct))
        .collect();

    let has_drift = provider.has_drift_times();
    features
        .par_iter_mut()
        .zip(kept.par_iter())
        .for_each(|(feature, cand)| {
            let (scans, rep) = link_ms2(
                provider,
                feature.accurate_mass,
                (feature.chrom_left.rt, feature.chrom_right.rt),
                feature.chrom_top.rt,
                None,
                params.ms2_precursor_tolerance,
            );
            feature.ms2_scans = scans;
            feature.ms2_raw_scan = rep;
            if has_drift {
                let lo = axis.points[cand.top.saturating_sub(1)].time;
                let hi = axis.points[(cand.top + 1).min(axis.len() - 1)].time;
                feature.drift_features = spot_drift_features(provider, feature, (lo, hi), params);
            }
        });

    assign_isotopes(
        &mut features,
        &params.ms1_tolerance,
        params.isotope_rt_tolerance,
        params.max_isotope_charge,
    );

    info!(
        "Spotted {} features ({} before deduplication) in {:?}",
        features.len(),
        num_candidates,
        start.elapsed()
    );
    Some(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::CancellationToken;
    use chromquery::{
        InMemoryDataProvider,
        PrecursorInfo,
        RawSpectrum,
        SpectrumPeak,
    };

    fn gaussian(t: f64, center: f64, sigma: f64, height: f64) -> f64 {
        height * (-0.5 * ((t - center) / sigma).powi(2)).exp()
    }

    /// MS1 scans every 0.01 min from 4.5 to 5.5 plus an MS2 scan after each.
    fn synthetic_run(compounds: &[(f64, f64, f64)]) -> InMemoryDataProvider {
        let mut spectra = Vec::new();
        for i in 0..=100 {
            let rt = 4.5 + i as f64 * 0.01;
            let mut peaks: Vec<SpectrumPeak> = compounds
                .iter()
                .map(|&(mz, center, height)| SpectrumPeak::new(mz, gaussian(rt, center, 0.03, height)))
                .filter(|p| p.intensity > 1.0)
                .collect();
            peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
            spectra.push(RawSpectrum {
                index: 2 * i,
                rt_minutes: rt,
                drift_time: None,
                ms_level: 1,
                precursor: None,
                peaks,
            });
            spectra.push(RawSpectrum {
                index: 2 * i + 1,
                rt_minutes: rt + 0.005,
                drift_time: None,
                ms_level: 2,
                precursor: Some(PrecursorInfo {
                    mz: 300.1,
                    collision_energy: None,
                    isolation_half_width: None,
                }),
                peaks: vec![SpectrumPeak::new(100.0, 10.0)],
            });
        }
        InMemoryDataProvider::new(spectra)
    }

    fn params() -> PeakPickingParameter {
        PeakPickingParameter {
            mass_range_begin: 100.0,
            mass_range_end: 1000.0,
            smoothing_level: 1,
            detection: PeakDetectionParameters {
                minimum_amplitude: 100.0,
                minimum_datapoints: 5,
                signal_to_noise_threshold: 0.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_single_compound() {
        let provider = synthetic_run(&[(300.1, 5.0, 1000.0)]);
        let token = CancellationToken::new();
        let features = spot_peaks(&provider, &params(), &RunContext::new(&token)).unwrap();
        assert_eq!(features.len(), 1, "{features:#?}");
        let f = &features[0];
        assert!((f.chrom_top.rt - 5.0).abs() < 0.011);
        assert!((f.accurate_mass - 300.1).abs() < 1e-6);
        assert!((f.height - 1000.0).abs() < 1.0);
        assert_eq!(f.adduct, "[M+H]+");
        let rep = f.ms2_raw_scan.unwrap();
        assert_eq!(provider.spectrum(rep).unwrap().ms_level, 2);
        assert!(f.ms2_scans.len() > 3);
    }

    #[test]
    fn test_sorted_and_numbered() {
        let provider = synthetic_run(&[(500.2, 4.8, 2000.0), (300.1, 5.0, 1000.0), (200.05, 5.0, 800.0)]);
        let token = CancellationToken::new();
        let features = spot_peaks(&provider, &params(), &RunContext::new(&token)).unwrap();
        assert_eq!(features.len(), 3);
        let ids: Vec<usize> = features.iter().map(|f| f.peak_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!((features[0].accurate_mass - 500.2).abs() < 1e-6);
        assert!((features[1].accurate_mass - 200.05).abs() < 1e-6);
        assert!((features[2].accurate_mass - 300.1).abs() < 1e-6);
    }

    /// Frames every 0.01 min, each split into drift bins of 0.1 from 20.0.
    ///
    /// One m/z elutes at 5.0 min as two conformers drifting at 21.0 and 22.5.
    /// MS2 frames only cover the first conformer.
    fn drift_run() -> InMemoryDataProvider {
        let mut spectra = Vec::new();
        for i in 0..=100 {
            let rt = 4.5 + i as f64 * 0.01;
            for k in 0..40 {
                let drift = 20.0 + k as f64 * 0.1;
                let intensity = gaussian(rt, 5.0, 0.03, 1.0)
                    * (gaussian(drift, 21.0, 0.15, 1000.0) + gaussian(drift, 22.5, 0.15, 600.0));
                let peaks = if intensity > 1.0 {
                    vec![SpectrumPeak::new(300.1, intensity)]
                } else {
                    vec![]
                };
                spectra.push(RawSpectrum {
                    index: 100 * i + k,
                    rt_minutes: rt,
                    drift_time: Some(drift),
                    ms_level: 1,
                    precursor: None,
                    peaks,
                });
            }
            spectra.push(RawSpectrum {
                index: 100 * i + 50,
                rt_minutes: rt + 0.005,
                drift_time: Some(21.0),
                ms_level: 2,
                precursor: Some(PrecursorInfo {
                    mz: 300.1,
                    collision_energy: None,
                    isolation_half_width: None,
                }),
                peaks: vec![SpectrumPeak::new(100.0, 10.0)],
            });
        }
        InMemoryDataProvider::new(spectra)
    }

    #[test]
    fn test_drift_features() {
        let provider = drift_run();
        let token = CancellationToken::new();
        let features = spot_peaks(&provider, &params(), &RunContext::new(&token)).unwrap();
        assert_eq!(features.len(), 1, "{features:#?}");
        let parent = &features[0];
        assert!((parent.chrom_top.rt - 5.0).abs() < 0.011);
        assert!(parent.ms2_raw_scan.is_some());

        let drift = &parent.drift_features;
        assert_eq!(drift.len(), 2, "{drift:#?}");
        assert!((drift[0].chrom_top.drift - 21.0).abs() < 0.051);
        assert!((drift[1].chrom_top.drift - 22.5).abs() < 0.051);
        assert!(drift[0].height > drift[1].height);
        for (i, d) in drift.iter().enumerate() {
            assert_eq!(d.peak_id, i);
            assert_eq!(d.chrom_top.rt, parent.chrom_top.rt);
            assert!((d.accurate_mass - 300.1).abs() < 1e-6);
            assert!(d.chrom_left.drift < d.chrom_top.drift && d.chrom_top.drift < d.chrom_right.drift);
        }
        assert!(drift[0].chrom_right.drift < drift[1].chrom_left.drift);

        // MS2 is only linked inside the drift boundaries.
        let rep = drift[0].ms2_raw_scan.unwrap();
        assert_eq!(provider.spectrum(rep).unwrap().drift_time, Some(21.0));
        assert!(drift[1].ms2_raw_scan.is_none());
        assert!(drift[1].ms2_scans.is_empty());
    }

    #[test]
    fn test_without_drift_times_no_drift_features() {
        let provider = synthetic_run(&[(300.1, 5.0, 1000.0)]);
        let token = CancellationToken::new();
        let features = spot_peaks(&provider, &params(), &RunContext::new(&token)).unwrap();
        assert!(features[0].drift_features.is_empty());
    }

    #[test]
    fn test_no_ms1_is_empty() {
        let provider = InMemoryDataProvider::new(vec![]);
        let token = CancellationToken::new();
        let features = spot_peaks(&provider, &params(), &RunContext::new(&token)).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_cancelled() {
        let provider = synthetic_run(&[(300.1, 5.0, 1000.0)]);
        let token = CancellationToken::new();
        token.cancel();
        assert!(spot_peaks(&provider, &params(), &RunContext::new(&token)).is_none());
    }

    #[test]
    fn test_mass_slicing() {
        let slicing = MassSlicing::new(&PeakPickingParameter {
            mass_range_begin: 100.0,
            mass_range_end: 200.0,
            mass_slice_width: 0.1,
            ..Default::default()
        })
        .unwrap();
        let bins: Vec<usize> = slicing.bins_of(100.12).collect();
        for b in &bins {
            let (lo, hi) = slicing.bounds(*b);
            assert!(lo <= 100.12 && 100.12 <= hi, "{b} {lo} {hi}");
        }
        assert_eq!(bins.len(), 2);
    }
}
