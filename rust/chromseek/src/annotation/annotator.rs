use chromquery::DataProvider;
use chromquery::models::MzTolerance;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

use super::scorer::{
    MatchScorer,
    QueryProperties,
    scorer_for,
};
use super::search::candidate_range;
use crate::models::{
    ChromatogramPeakFeature,
    IsotopeRatios,
    MatchResultContainer,
    MsDecResult,
    MsScanMatchResult,
    ReferenceLibrary,
};
use crate::parameters::AnnotationParameter;
use crate::pipeline::context::{
    ProcessingStage,
    RunContext,
};
use crate::spotting::isotopes::C13_C12_DIFF;

/// Observed M+1 and M+2 ratios of a feature, read from the MS1 scan at its top.
///
/// `None` when the scan is missing or has no monoisotopic signal.
pub fn observed_isotope_ratios<P: DataProvider + ?Sized>(
    provider: &P,
    feature: &ChromatogramPeakFeature,
    tolerance: &MzTolerance,
) -> Option<IsotopeRatios> {
    let scan = provider.spectrum(feature.scan_top)?;
    let charge = feature.isotope.charge.max(1) as f64;
    let intensity_at = |mz: f64| {
        tolerance
            .mz_range(mz)
            .and_then(|r| scan.max_peak_in(r.start(), r.end()))
            .map_or(0.0, |p| p.intensity)
    };
    let m0 = intensity_at(feature.accurate_mass);
    if !(m0 > 0.0) {
        return None;
    }
    Some(IsotopeRatios {
        m1: intensity_at(feature.accurate_mass + C13_C12_DIFF / charge) / m0,
        m2: intensity_at(feature.accurate_mass + 2.0 * C13_C12_DIFF / charge) / m0,
    })
}

/// Sorts by total score (ties to the library index), drops what is below
/// the cutoff and numbers the rest.
fn rank(mut results: Vec<MsScanMatchResult>, cutoff: f64) -> Vec<MsScanMatchResult> {
    results.retain(|r| r.total_score >= cutoff);
    results.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then(a.library_index.cmp(&b.library_index))
    });
    for (i, r) in results.iter_mut().enumerate() {
        r.rank = i;
    }
    results
}

/// Library search for single features.
///
/// Both libraries are sorted on construction of [`ReferenceLibrary`].
pub struct Annotator<'a> {
    spectral_library: &'a ReferenceLibrary,
    text_library: &'a ReferenceLibrary,
    params: &'a AnnotationParameter,
    scorer: Box<dyn MatchScorer>,
}

impl<'a> Annotator<'a> {
    pub fn new(
        spectral_library: &'a ReferenceLibrary,
        text_library: &'a ReferenceLibrary,
        params: &'a AnnotationParameter,
    ) -> Self {
        Self {
            spectral_library,
            text_library,
            params,
            scorer: scorer_for(params.target_omics),
        }
    }

    /// Ranked matches of one feature. Empty when nothing is in tolerance.
    pub fn annotate(
        &self,
        feature: &ChromatogramPeakFeature,
        msdec: &MsDecResult,
        isotopes: Option<IsotopeRatios>,
    ) -> MatchResultContainer {
        let mass = feature.accurate_mass;
        let query = QueryProperties {
            mass,
            mass_tolerance: self.params.ms1_tolerance.da_at(mass),
            rt: feature.chrom_top.rt,
            spectrum: &msdec.spectrum,
            isotopes,
        };

        let spectral_lib = self.spectral_library.as_slice();
        let spectral: Vec<MsScanMatchResult> = spectral_lib
            [candidate_range(spectral_lib, mass, query.mass_tolerance)]
        .iter()
        .filter_map(|r| self.scorer.score_spectral(&query, r, self.params))
        .collect();

        let text_lib = self.text_library.as_slice();
        let text: Vec<MsScanMatchResult> = text_lib[candidate_range(text_lib, mass, query.mass_tolerance)]
            .iter()
            .filter_map(|r| self.scorer.score_text(&query, r, self.params))
            .collect();

        let mut container = MatchResultContainer::default();
        container.extend(rank(spectral, self.params.identification_score_cutoff));
        container.extend(rank(text, self.params.identification_score_cutoff));
        container
    }

    /// Annotates all the features of a file in parallel and writes their
    /// primary identity.
    ///
    /// `msdec_results` must be parallel to `features`. Returns `None` if the
    /// run was cancelled, features are left untouched in that case.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn annotate_all<P: DataProvider + ?Sized>(
        &self,
        provider: &P,
        features: &mut [ChromatogramPeakFeature],
        msdec_results: &[MsDecResult],
        ctx: &RunContext,
    ) -> Option<Vec<MatchResultContainer>> {
        debug_assert_eq!(features.len(), msdec_results.len());
        let start = Instant::now();
        let counter = ctx.counter(ProcessingStage::Annotation, features.len());
        let containers: Vec<MatchResultContainer> = features
            .par_iter()
            .zip(msdec_results.par_iter())
            .map(|(feature, msdec)| {
                if ctx.is_cancelled() {
                    return None;
                }
                let isotopes = observed_isotope_ratios(provider, feature, &self.params.ms1_tolerance);
                let container = self.annotate(feature, msdec, isotopes);
                counter.tick();
                Some(container)
            })
            .collect::<Option<Vec<_>>>()?;

        let mut identified = 0;
        for (feature, container) in features.iter_mut().zip(containers.iter()) {
            feature.primary_identity = container.primary().cloned();
            if feature.primary_identity.is_some() {
                identified += 1;
            }
        }
        info!(
            "Annotated {} of {} features ({} scoring) in {:?}",
            identified,
            features.len(),
            self.scorer.name(),
            start.elapsed()
        );
        Some(containers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnnotationSource,
        IsotopeCharacter,
        MoleculeMsReference,
    };
    use crate::pipeline::context::CancellationToken;
    use chromquery::{
        ChromXs,
        InMemoryDataProvider,
        RawSpectrum,
        SpectrumPeak,
    };

    fn spectrum(v: &[(f64, f64)]) -> Vec<SpectrumPeak> {
        v.iter().map(|&(mz, i)| SpectrumPeak::new(mz, i)).collect()
    }

    fn feature(mass: f64) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature {
            peak_id: 0,
            chrom_top: ChromXs::from_rt(5.0),
            chrom_left: ChromXs::from_rt(4.9),
            chrom_right: ChromXs::from_rt(5.1),
            scan_top: 0,
            scan_left: 0,
            scan_right: 0,
            accurate_mass: mass,
            height: 1000.0,
            area: 1.0,
            signal_to_noise: 10.0,
            estimated_noise: 1.0,
            isotope: IsotopeCharacter::monoisotopic(0),
            adduct: "[M+H]+".into(),
            ms2_raw_scan: None,
            ms2_scans: vec![],
            drift_features: vec![],
            primary_identity: None,
            alignment_id: None,
        }
    }

    fn libraries() -> (ReferenceLibrary, ReferenceLibrary) {
        let frag = spectrum(&[(100.0, 100.0), (150.0, 50.0)]);
        let spectral = ReferenceLibrary::new(vec![
            MoleculeMsReference {
                name: "good".into(),
                precursor_mz: 300.1,
                spectrum: frag.clone(),
                ..Default::default()
            },
            MoleculeMsReference {
                name: "wrong_spectrum".into(),
                precursor_mz: 300.101,
                spectrum: spectrum(&[(80.0, 100.0)]),
                ..Default::default()
            },
            MoleculeMsReference {
                name: "far".into(),
                precursor_mz: 400.0,
                spectrum: frag,
                ..Default::default()
            },
        ]);
        let text = ReferenceLibrary::new(vec![MoleculeMsReference {
            name: "text".into(),
            precursor_mz: 300.1,
            ..Default::default()
        }]);
        (spectral, text)
    }

    #[test]
    fn test_ranking_and_primary() {
        let (spectral, text) = libraries();
        let params = AnnotationParameter::default();
        let annotator = Annotator::new(&spectral, &text, &params);
        let msdec = MsDecResult {
            spectrum: spectrum(&[(100.0, 90.0), (150.0, 60.0)]),
            ..Default::default()
        };
        let container = annotator.annotate(&feature(300.1), &msdec, None);
        let spectral_hits: Vec<&str> = container
            .by_source(AnnotationSource::SpectralLibrary)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(spectral_hits, vec!["good", "wrong_spectrum"]);
        assert_eq!(container.by_source(AnnotationSource::TextLibrary).count(), 1);
        let primary = container.primary().unwrap();
        assert_eq!(primary.name, "good");
        assert!(primary.is_spectrum_match);
        assert_eq!(primary.rank, 0);
    }

    #[test]
    fn test_text_hit_wins_without_spectrum() {
        let (spectral, text) = libraries();
        let params = AnnotationParameter::default();
        let annotator = Annotator::new(&spectral, &text, &params);
        let container = annotator.annotate(&feature(300.1), &MsDecResult::default(), None);
        assert_eq!(container.primary().unwrap().name, "text");
    }

    #[test]
    fn test_empty_libraries() {
        let empty = ReferenceLibrary::default();
        let params = AnnotationParameter::default();
        let annotator = Annotator::new(&empty, &empty, &params);
        let container = annotator.annotate(&feature(300.1), &MsDecResult::default(), None);
        assert!(container.is_empty());
        assert!(container.primary().is_none());
    }

    #[test]
    fn test_annotate_all_sets_identity() {
        let (spectral, text) = libraries();
        let params = AnnotationParameter::default();
        let annotator = Annotator::new(&spectral, &text, &params);
        let provider = InMemoryDataProvider::new(vec![RawSpectrum {
            index: 0,
            rt_minutes: 5.0,
            drift_time: None,
            ms_level: 1,
            precursor: None,
            peaks: spectrum(&[(300.1, 1000.0), (301.1034, 200.0)]),
        }]);
        let mut features = vec![feature(300.1), feature(999.0)];
        let msdec = vec![MsDecResult::default(), MsDecResult::default()];
        let token = CancellationToken::new();
        let containers = annotator
            .annotate_all(&provider, &mut features, &msdec, &RunContext::new(&token))
            .unwrap();
        assert_eq!(containers.len(), 2);
        assert!(features[0].primary_identity.is_some());
        assert!(features[1].primary_identity.is_none());
        assert!(containers[1].is_empty());
    }

    #[test]
    fn test_observed_isotope_ratios() {
        let provider = InMemoryDataProvider::new(vec![RawSpectrum {
            index: 0,
            rt_minutes: 5.0,
            drift_time: None,
            ms_level: 1,
            precursor: None,
            peaks: spectrum(&[(300.1, 1000.0), (301.1034, 200.0), (302.1067, 20.0)]),
        }]);
        let ratios = observed_isotope_ratios(&provider, &feature(300.1), &MzTolerance::Scaled(0.01)).unwrap();
        assert!((ratios.m1 - 0.2).abs() < 1e-9);
        assert!((ratios.m2 - 0.02).abs() < 1e-9);
        assert!(observed_isotope_ratios(&provider, &feature(500.0), &MzTolerance::Scaled(0.01)).is_none());
    }
}
