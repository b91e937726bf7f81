//! Omics specific scoring strategies.
//!
//! Both strategies compute the same similarity measures, they only differ
//! in how the spectral evidence is weighted and in when a spectrum counts as
//! matched. The strategy is picked once per run from [`TargetOmics`].

use chromquery::SpectrumPeak;

use super::similarity::{
    SpectrumSimilarity,
    isotope_similarity,
    spectrum_similarity,
};
use crate::models::{
    AnnotationSource,
    IsotopeRatios,
    MoleculeMsReference,
    MsScanMatchResult,
};
use crate::parameters::{
    AnnotationParameter,
    TargetOmics,
};
use crate::utils::correlation::gaussian_similarity;

/// What is known about the feature being annotated.
#[derive(Debug, Clone, Copy)]
pub struct QueryProperties<'a> {
    pub mass: f64,
    /// Half width of the precursor window used for the candidate search.
    pub mass_tolerance: f64,
    pub rt: f64,
    /// Deconvoluted spectrum, sorted by m/z.
    pub spectrum: &'a [SpectrumPeak],
    pub isotopes: Option<IsotopeRatios>,
}

/// Weight of the MS/MS score in the total score.
const MSMS_SCORE_WEIGHT: f64 = 2.0;

pub trait MatchScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Combines the spectral measures into a single 0 - 1 score.
    fn msms_score(&self, similarity: &SpectrumSimilarity) -> f64;

    fn is_spectrum_match(&self, similarity: &SpectrumSimilarity, params: &AnnotationParameter) -> bool;

    /// Scores a candidate of the full spectrum library.
    ///
    /// Returns `None` when RT filtering is on and the reference is out of
    /// the RT tolerance.
    fn score_spectral(
        &self,
        query: &QueryProperties,
        reference: &MoleculeMsReference,
        params: &AnnotationParameter,
    ) -> Option<MsScanMatchResult> {
        let mut result = score_precursor(query, reference, params, AnnotationSource::SpectralLibrary)?;
        let similarity = spectrum_similarity(query.spectrum, &reference.spectrum, &params.ms2_tolerance);
        let msms = self.msms_score(&similarity);

        let mut weighted = MSMS_SCORE_WEIGHT * msms + result.accurate_mass_similarity;
        let mut weights = MSMS_SCORE_WEIGHT + 1.0;
        if let Some(rt) = result.rt_similarity {
            weighted += rt;
            weights += 1.0;
        }

        result.total_score = weighted / weights;
        result.weighted_dot_product = similarity.weighted_dot_product;
        result.reverse_dot_product = similarity.reverse_dot_product;
        result.matched_peaks_percentage = similarity.matched_peaks_percentage;
        result.matched_peaks_count = similarity.matched_peaks_count;
        result.is_spectrum_match = self.is_spectrum_match(&similarity, params);
        Some(result)
    }

    /// Scores a candidate of the precursor only library.
    fn score_text(
        &self,
        query: &QueryProperties,
        reference: &MoleculeMsReference,
        params: &AnnotationParameter,
    ) -> Option<MsScanMatchResult> {
        let mut result = score_precursor(query, reference, params, AnnotationSource::TextLibrary)?;
        result.total_score = match result.rt_similarity {
            Some(rt) => 0.5 * (result.accurate_mass_similarity + rt),
            None => result.accurate_mass_similarity,
        };
        Some(result)
    }
}

/// Precursor level part of the score, shared by both libraries.
fn score_precursor(
    query: &QueryProperties,
    reference: &MoleculeMsReference,
    params: &AnnotationParameter,
    source: AnnotationSource,
) -> Option<MsScanMatchResult> {
    let rt_diff = reference.retention_time.map(|rt| rt - query.rt);
    let is_rt_match = rt_diff.is_some_and(|d| d.abs() <= params.rt_tolerance);
    if params.use_rt_for_filtering && rt_diff.is_some() && !is_rt_match {
        return None;
    }
    let rt_similarity = if params.use_rt_for_scoring {
        rt_diff.map(|d| gaussian_similarity(d, params.rt_tolerance))
    } else {
        None
    };
    let isotope_similarity = match (&query.isotopes, &reference.isotope_ratios) {
        (Some(obs), Some(theo)) => Some(isotope_similarity(obs, theo, params.isotope_ratio_tolerance)),
        _ => None,
    };

    Some(MsScanMatchResult {
        name: reference.name.clone(),
        library_index: reference.library_index,
        source,
        accurate_mass_similarity: gaussian_similarity(
            reference.precursor_mz - query.mass,
            query.mass_tolerance,
        ),
        rt_similarity,
        isotope_similarity,
        is_precursor_mz_match: (reference.precursor_mz - query.mass).abs() <= query.mass_tolerance,
        is_rt_match,
        ..Default::default()
    })
}

fn passes_cutoffs(similarity: &SpectrumSimilarity, params: &AnnotationParameter, min_peaks: usize) -> bool {
    similarity.matched_peaks_count >= min_peaks
        && similarity.weighted_dot_product >= params.weighted_dot_product_cutoff
        && similarity.reverse_dot_product >= params.reverse_dot_product_cutoff
        && similarity.matched_peaks_percentage * 100.0 >= params.matched_peaks_percentage_cutoff
}

/// Small molecule scoring, the dot products carry most of the weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetabolomicsScorer;

impl MatchScorer for MetabolomicsScorer {
    fn name(&self) -> &'static str {
        "metabolomics"
    }

    fn msms_score(&self, s: &SpectrumSimilarity) -> f64 {
        (3.0 * s.weighted_dot_product + 2.0 * s.reverse_dot_product + s.matched_peaks_percentage) / 6.0
    }

    fn is_spectrum_match(&self, s: &SpectrumSimilarity, params: &AnnotationParameter) -> bool {
        passes_cutoffs(s, params, params.minimum_matched_peaks.max(1))
    }
}

/// Lipid scoring.
///
/// Lipid spectra are dominated by few diagnostic fragments, so the presence
/// of the reference fragments weighs the most and at least two of them have
/// to be found.
#[derive(Debug, Clone, Copy, Default)]
pub struct LipidomicsScorer;

impl MatchScorer for LipidomicsScorer {
    fn name(&self) -> &'static str {
        "lipidomics"
    }

    fn msms_score(&self, s: &SpectrumSimilarity) -> f64 {
        (s.weighted_dot_product + 2.0 * s.reverse_dot_product + 3.0 * s.matched_peaks_percentage) / 6.0
    }

    fn is_spectrum_match(&self, s: &SpectrumSimilarity, params: &AnnotationParameter) -> bool {
        passes_cutoffs(s, params, params.minimum_matched_peaks.max(2))
    }
}

pub fn scorer_for(target: TargetOmics) -> Box<dyn MatchScorer> {
    match target {
        TargetOmics::Metabolomics => Box::new(MetabolomicsScorer),
        TargetOmics::Lipidomics => Box::new(LipidomicsScorer),
    }
}
