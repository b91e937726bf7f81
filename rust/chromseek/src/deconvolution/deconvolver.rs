//! Model peak based MS2 deconvolution.
//!
//! Every fragment of the representative MS2 scan gets its own chromatogram
//! over the MS2 scans of the same precursor around the feature top. The
//! fragment trace that best looks like a chromatographic peak at the feature
//! top becomes the model, fragments whose traces correlate with the model are
//! kept in the deconvoluted spectrum.

use chromquery::models::{
    Chromatogram,
    extract_eic,
    merge_equal_times,
};
use chromquery::utils::median;
use chromquery::{
    DataProvider,
    SpectrumPeak,
};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

use super::centroid::{
    centroid_spectrum,
    filter_spectrum,
};
use crate::models::{
    ChromatogramPeakFeature,
    ModelChromatogramPoint,
    MsDecResult,
};
use crate::parameters::DeconvolutionParameter;
use crate::pipeline::context::{
    ProcessingStage,
    RunContext,
};
use crate::spotting::ChromatogramPeaksDataSummary;
use crate::utils::correlation::{
    gaussian_profile,
    pearson_correlation,
};

/// A candidate fragment with its traces over the analysis window.
struct FragmentTrace {
    mz: f64,
    raw: Vec<f64>,
    smoothed: Vec<f64>,
}

impl FragmentTrace {
    /// Index of the smoothed maximum, ties to the earlier scan.
    fn apex(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.smoothed.iter().enumerate() {
            if *v > self.smoothed[best] {
                best = i;
            }
        }
        best
    }
}

struct ModelPeak {
    index: usize,
    apex: usize,
}

fn degraded_result(
    feature: &ChromatogramPeakFeature,
    precursor_mz: f64,
    spectrum: Vec<SpectrumPeak>,
) -> MsDecResult {
    MsDecResult {
        scan_id: feature.peak_id,
        raw_spectrum_id: feature.ms2_raw_scan,
        chrom: feature.chrom_top,
        precursor_mz,
        model_peak_mz: feature.accurate_mass,
        model_peak_height: feature.height,
        model_peak_area: feature.area,
        model_peak_purity: 0.0,
        model_masses: Vec::new(),
        model_chromatogram: Vec::new(),
        spectrum,
    }
}

fn correlation_or_zero(a: &[f64], b: &[f64]) -> f64 {
    match pearson_correlation(a, b) {
        Ok(r) if r.is_finite() => r,
        _ => 0.0,
    }
}

/// Picks the trace maximizing `apex * max(0, r)` where `r` is the correlation
/// with an ideal gaussian of the feature width. The apex has to fall within
/// `apex_tolerance` of the feature top. Ties go to the lower m/z.
fn select_model(
    traces: &[FragmentTrace],
    times: &[f64],
    top: f64,
    width: f64,
    apex_tolerance: f64,
) -> Option<ModelPeak> {
    let ideal = gaussian_profile(times, top, width / 4.0);
    let mut best: Option<(f64, ModelPeak)> = None;
    for (index, trace) in traces.iter().enumerate() {
        let apex = trace.apex();
        if (times[apex] - top).abs() > apex_tolerance {
            continue;
        }
        let score = trace.smoothed[apex] * correlation_or_zero(&trace.smoothed, &ideal).max(0.0);
        if !(score > 0.0) {
            continue;
        }
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, ModelPeak { index, apex }));
        }
    }
    best.map(|(_, m)| m)
}

fn trapezoid(times: &[f64], values: &[f64]) -> f64 {
    times
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, v)| 0.5 * (v[0] + v[1]) * (t[1] - t[0]))
        .sum()
}

/// Deconvolutes the MS2 data of one feature.
///
/// Never fails: with no MS2 scan the spectrum is empty, with too few scans or
/// no usable model trace the centroided representative spectrum is returned
/// as is (purity 0).
pub fn deconvolute<P: DataProvider + ?Sized>(
    provider: &P,
    feature: &ChromatogramPeakFeature,
    summary: &ChromatogramPeaksDataSummary,
    params: &DeconvolutionParameter,
) -> MsDecResult {
    let representative = match feature.ms2_raw_scan.and_then(|i| provider.spectrum(i)) {
        Some(s) => s,
        None => return degraded_result(feature, feature.accurate_mass, Vec::new()),
    };
    let precursor_mz = representative.precursor_mz().unwrap_or(feature.accurate_mass);
    let max_mz = params
        .remove_after_precursor
        .then_some(precursor_mz + params.kept_isotope_range);
    let centroided = centroid_spectrum(&representative.peaks, params.centroid_ms2_tolerance);
    let reference = filter_spectrum(
        centroided.clone(),
        params.amplitude_cutoff,
        params.relative_amplitude_cutoff,
        max_mz,
    );
    if reference.is_empty() {
        return degraded_result(feature, precursor_mz, reference);
    }

    let width = feature.peak_width();
    let top = feature.chrom_top.rt;
    let half_window = summary.deconvolution_window(width) / 2.0;
    let spectra = provider.spectra();
    let scans = provider.ms2_positions_for_precursor(
        top - half_window,
        top + half_window,
        precursor_mz,
        params.same_precursor_tolerance,
    );

    let trace_of = |mz: f64| -> Chromatogram {
        let Some(range) = params.ms2_tolerance.mz_range(mz) else {
            return Chromatogram::default();
        };
        let eic = extract_eic(scans.iter().map(|&i| (i, &spectra[i])), range.start(), range.end());
        Chromatogram {
            points: merge_equal_times(eic.points),
        }
    };
    let times = trace_of(reference[0].mz).times();
    if times.len() < params.minimum_scans.max(3) {
        return degraded_result(feature, precursor_mz, reference);
    }

    let traces: Vec<FragmentTrace> = reference
        .iter()
        .map(|p| {
            let trace = trace_of(p.mz);
            FragmentTrace {
                mz: p.mz,
                raw: trace.intensities(),
                smoothed: trace.smoothed_intensities(params.smoothing_method, params.smoothing_level),
            }
        })
        .collect();

    let spacing = median(&times.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>()).unwrap_or(0.0);
    let model = match select_model(&traces, &times, top, width, (width / 2.0).max(spacing)) {
        Some(m) => m,
        None => return degraded_result(feature, precursor_mz, reference),
    };
    let model_trace = &traces[model.index];

    let mut total = 0.0;
    let mut kept: Vec<SpectrumPeak> = Vec::new();
    for trace in traces.iter() {
        let intensity = trace.raw[model.apex];
        total += intensity;
        if intensity <= 0.0 {
            continue;
        }
        let r = correlation_or_zero(&trace.smoothed, &model_trace.smoothed);
        if r >= params.correlation_threshold {
            kept.push(SpectrumPeak::new(trace.mz, intensity));
        }
    }
    let kept_total: f64 = kept.iter().map(|p| p.intensity).sum();
    let purity = if total > 0.0 { kept_total / total } else { 0.0 };
    let model_masses = kept.iter().map(|p| p.mz).collect();

    // Precursor isotopes come back unfiltered from the representative scan.
    if params.keep_original_precursor_isotopes {
        let lo = precursor_mz - params.ms2_tolerance.da_at(precursor_mz);
        let hi = precursor_mz + params.kept_isotope_range;
        kept.retain(|p| p.mz < lo || p.mz > hi);
        kept.extend(centroided.iter().filter(|p| lo <= p.mz && p.mz <= hi).copied());
    }
    kept.sort_by(|a, b| a.mz.total_cmp(&b.mz));

    MsDecResult {
        scan_id: feature.peak_id,
        raw_spectrum_id: feature.ms2_raw_scan,
        chrom: feature.chrom_top,
        precursor_mz,
        model_peak_mz: model_trace.mz,
        model_peak_height: model_trace.raw[model.apex],
        model_peak_area: trapezoid(&times, &model_trace.raw),
        model_peak_purity: purity,
        model_masses,
        model_chromatogram: times
            .iter()
            .zip(model_trace.smoothed.iter())
            .map(|(&rt, &intensity)| ModelChromatogramPoint { rt, intensity })
            .collect(),
        spectrum: kept,
    }
}

/// Deconvolutes every feature of a file in parallel.
///
/// Output index `i` belongs to feature `i`. Returns `None` if cancelled.
#[tracing::instrument(skip_all, level = "debug")]
pub fn deconvolute_all<P: DataProvider + ?Sized>(
    provider: &P,
    features: &[ChromatogramPeakFeature],
    summary: &ChromatogramPeaksDataSummary,
    params: &DeconvolutionParameter,
    ctx: &RunContext,
) -> Option<Vec<MsDecResult>> {
    let start = Instant::now();
    let counter = ctx.counter(ProcessingStage::Deconvolution, features.len());
    let results: Option<Vec<MsDecResult>> = features
        .par_iter()
        .map(|feature| {
            if ctx.is_cancelled() {
                return None;
            }
            let result = deconvolute(provider, feature, summary, params);
            counter.tick();
            Some(result)
        })
        .collect();

    match &results {
        Some(r) => {
            let with_model = r.iter().filter(|x| x.has_model()).count();
            info!(
                "Deconvoluted {} features ({} with a model peak) in {:?}",
                r.len(),
                with_model,
                start.elapsed()
            );
        }
        None => debug!("Deconvolution cancelled"),
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IsotopeCharacter;
    use chromquery::{
        ChromXs,
        InMemoryDataProvider,
        PrecursorInfo,
        RawSpectrum,
    };

    fn gaussian(t: f64, center: f64, sigma: f64, height: f64) -> f64 {
        height * (-0.5 * ((t - center) / sigma).powi(2)).exp()
    }

    fn ms2_run() -> InMemoryDataProvider {
        ms2_run_with(&[])
    }

    /// `extra` holds (m/z, height) of additional coeluting peaks above 200.
    fn ms2_run_with(extra: &[(f64, f64)]) -> InMemoryDataProvider {
        let spectra = (0..41)
            .map(|i| {
                let rt = 4.8 + i as f64 * 0.01;
                let noise = 40.0 + 15.0 * ((i * 7) % 5) as f64;
                let mut peaks = vec![
                    SpectrumPeak::new(100.0, gaussian(rt, 5.0, 0.03, 1000.0) + 0.5),
                    SpectrumPeak::new(150.0, gaussian(rt, 5.0, 0.03, 500.0) + 0.5),
                    SpectrumPeak::new(200.0, noise),
                ];
                peaks.extend(
                    extra
                        .iter()
                        .map(|&(mz, height)| SpectrumPeak::new(mz, gaussian(rt, 5.0, 0.03, height) + 0.5)),
                );
                RawSpectrum {
                    index: i,
                    rt_minutes: rt,
                    drift_time: None,
                    ms_level: 2,
                    precursor: Some(PrecursorInfo {
                        mz: 300.1,
                        collision_energy: None,
                        isolation_half_width: None,
                    }),
                    peaks,
                }
            })
            .collect();
        InMemoryDataProvider::new(spectra)
    }

    fn feature(ms2: Option<usize>) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature {
            peak_id: 7,
            chrom_top: ChromXs::from_rt(5.0),
            chrom_left: ChromXs::from_rt(4.9),
            chrom_right: ChromXs::from_rt(5.1),
            scan_top: 0,
            scan_left: 0,
            scan_right: 0,
            accurate_mass: 300.1,
            height: 1000.0,
            area: 10.0,
            signal_to_noise: 10.0,
            estimated_noise: 1.0,
            isotope: IsotopeCharacter::monoisotopic(7),
            adduct: "[M+H]+".into(),
            ms2_raw_scan: ms2,
            ms2_scans: vec![],
            drift_features: vec![],
            primary_identity: None,
            alignment_id: None,
        }
    }

    #[test]
    fn test_keeps_coeluting_fragments() {
        let provider = ms2_run();
        let result = deconvolute(
            &provider,
            &feature(Some(20)),
            &ChromatogramPeaksDataSummary::default(),
            &DeconvolutionParameter::default(),
        );
        let mzs: Vec<f64> = result.spectrum.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![100.0, 150.0]);
        assert_eq!(result.model_peak_mz, 100.0);
        assert!(result.model_peak_purity > 0.9);
        assert_eq!(result.scan_id, 7);
        assert_eq!(result.precursor_mz, 300.1);
        assert!(!result.model_chromatogram.is_empty());
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let provider = ms2_run();
        let summary = ChromatogramPeaksDataSummary::default();
        let params = DeconvolutionParameter::default();
        let first = deconvolute(&provider, &feature(Some(20)), &summary, &params);
        let second = deconvolute(&provider, &feature(Some(20)), &summary, &params);
        let bits = |r: &MsDecResult| -> Vec<(u64, u64)> {
            r.spectrum
                .iter()
                .map(|p| (p.mz.to_bits(), p.intensity.to_bits()))
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_window_follows_feature_width() {
        let result = deconvolute(
            &ms2_run(),
            &feature(Some(20)),
            &ChromatogramPeaksDataSummary::default(),
            &DeconvolutionParameter::default(),
        );
        // The feature spans 4.9 to 5.1, the run 4.8 to 5.2.
        let rts: Vec<f64> = result.model_chromatogram.iter().map(|p| p.rt).collect();
        assert!(rts.len() >= 19 && rts.len() <= 21, "{rts:?}");
        assert!(rts.iter().all(|rt| (4.9 - 1e-6..=5.1 + 1e-6).contains(rt)), "{rts:?}");
    }

    #[test]
    fn test_keeps_raw_precursor_isotopes() {
        // M+1 is too small for the amplitude cutoff.
        let provider = ms2_run_with(&[(300.1, 800.0), (301.1034, 30.0)]);
        let params = DeconvolutionParameter {
            amplitude_cutoff: 50.0,
            keep_original_precursor_isotopes: true,
            ..Default::default()
        };
        let summary = ChromatogramPeaksDataSummary::default();
        let result = deconvolute(&provider, &feature(Some(20)), &summary, &params);
        let mzs: Vec<f64> = result.spectrum.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![100.0, 150.0, 300.1, 301.1034]);
        let m1 = result.spectrum[3];
        assert!((m1.intensity - 30.5).abs() < 1e-9);

        let params = DeconvolutionParameter {
            amplitude_cutoff: 50.0,
            ..Default::default()
        };
        let result = deconvolute(&provider, &feature(Some(20)), &summary, &params);
        let mzs: Vec<f64> = result.spectrum.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![100.0, 150.0, 300.1]);
    }

    #[test]
    fn test_without_ms2_is_empty() {
        let provider = ms2_run();
        let result = deconvolute(
            &provider,
            &feature(None),
            &ChromatogramPeaksDataSummary::default(),
            &DeconvolutionParameter::default(),
        );
        assert!(result.spectrum.is_empty());
        assert_eq!(result.model_peak_mz, 300.1);
        assert_eq!(result.model_peak_height, 1000.0);
        assert_eq!(result.chrom.rt, 5.0);
    }

    #[test]
    fn test_too_few_scans_degrades() {
        let provider = ms2_run();
        let params = DeconvolutionParameter {
            minimum_scans: 1000,
            ..Default::default()
        };
        let result = deconvolute(
            &provider,
            &feature(Some(20)),
            &ChromatogramPeaksDataSummary::default(),
            &params,
        );
        assert_eq!(result.spectrum.len(), 3);
        assert_eq!(result.model_peak_purity, 0.0);
        assert!(!result.has_model());
    }

    #[test]
    fn test_precursor_removal() {
        let provider = InMemoryDataProvider::new(vec![RawSpectrum {
            index: 0,
            rt_minutes: 5.0,
            drift_time: None,
            ms_level: 2,
            precursor: Some(PrecursorInfo {
                mz: 120.0,
                collision_energy: None,
                isolation_half_width: None,
            }),
            peaks: vec![SpectrumPeak::new(100.0, 10.0), SpectrumPeak::new(150.0, 10.0)],
        }]);
        let result = deconvolute(
            &provider,
            &feature(Some(0)),
            &ChromatogramPeaksDataSummary::default(),
            &DeconvolutionParameter::default(),
        );
        assert_eq!(result.spectrum, vec![SpectrumPeak::new(100.0, 10.0)]);
    }

    #[test]
    fn test_parallel_keeps_order() {
        let provider = ms2_run();
        let features: Vec<_> = (0..8)
            .map(|i| {
                let mut f = feature(if i % 2 == 0 { Some(20) } else { None });
                f.peak_id = i;
                f
            })
            .collect();
        let token = crate::pipeline::context::CancellationToken::new();
        let ctx = RunContext::new(&token);
        let out = deconvolute_all(
            &provider,
            &features,
            &ChromatogramPeaksDataSummary::default(),
            &DeconvolutionParameter::default(),
            &ctx,
        )
        .unwrap();
        let ids: Vec<usize> = out.iter().map(|r| r.scan_id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert!(out[0].has_model());
        assert!(!out[1].has_model());
    }
}
