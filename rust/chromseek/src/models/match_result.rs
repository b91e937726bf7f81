use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AnnotationSource {
    /// Full spectrum (MSP) library.
    #[default]
    SpectralLibrary,
    /// Precursor only (text) library.
    TextLibrary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MsScanMatchResult {
    pub name: String,
    pub library_index: usize,
    pub source: AnnotationSource,
    pub total_score: f64,
    pub weighted_dot_product: f64,
    pub reverse_dot_product: f64,
    pub matched_peaks_percentage: f64,
    pub matched_peaks_count: usize,
    pub accurate_mass_similarity: f64,
    pub rt_similarity: Option<f64>,
    pub isotope_similarity: Option<f64>,
    pub is_precursor_mz_match: bool,
    pub is_spectrum_match: bool,
    pub is_rt_match: bool,
    pub rank: usize,
}

/// Ranked match results of a single feature.
///
/// Built once by the annotator, results are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MatchResultContainer {
    results: Vec<MsScanMatchResult>,
}

impl MatchResultContainer {
    pub fn push(&mut self, result: MsScanMatchResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = MsScanMatchResult>) {
        self.results.extend(results);
    }

    pub fn results(&self) -> &[MsScanMatchResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn by_source(&self, source: AnnotationSource) -> impl Iterator<Item = &MsScanMatchResult> + '_ {
        self.results.iter().filter(move |r| r.source == source)
    }

    /// Primary identity.
    ///
    /// Best spectrum matched library hit, then the best text library hit and
    /// finally the best precursor only suggestion of the spectral library.
    pub fn primary(&self) -> Option<&MsScanMatchResult> {
        self.by_source(AnnotationSource::SpectralLibrary)
            .filter(|r| r.is_spectrum_match)
            .min_by_key(|r| r.rank)
            .or_else(|| {
                self.by_source(AnnotationSource::TextLibrary)
                    .min_by_key(|r| r.rank)
            })
            .or_else(|| {
                self.by_source(AnnotationSource::SpectralLibrary)
                    .min_by_key(|r| r.rank)
            })
    }
}
