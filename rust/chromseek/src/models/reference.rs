use chromquery::SpectrumPeak;
use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::LazyLock;

/// Relative abundances of the M+1 and M+2 isotopes (M = 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IsotopeRatios {
    pub m1: f64,
    pub m2: f64,
}

static FORMULA_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-z]?)(\d*)").expect("Valid regex"));

impl IsotopeRatios {
    /// Approximate natural isotope ratios from an elemental formula.
    ///
    /// Only C, H, N, O, S and Si contribute, other elements are ignored.
    /// Returns `None` when the formula has no carbon.
    pub fn from_formula(formula: &str) -> Option<Self> {
        let mut counts = [0f64; 6];
        for cap in FORMULA_ELEMENT.captures_iter(formula) {
            let n: f64 = match cap[2].parse::<u32>() {
                Ok(n) => n as f64,
                Err(_) => 1.0,
            };
            let slot = match &cap[1] {
                "C" => 0,
                "H" => 1,
                "N" => 2,
                "O" => 3,
                "S" => 4,
                "Si" => 5,
                _ => continue,
            };
            counts[slot] += n;
        }
        let [c, h, n, o, s, si] = counts;
        if c == 0.0 {
            return None;
        }
        let m1 = 0.0107 * c + 0.000115 * h + 0.00364 * n + 0.00038 * o + 0.0079 * s + 0.0508 * si;
        let m2 = (0.0107 * c).powi(2) / 2.0 + 0.00205 * o + 0.0421 * s + 0.0335 * si;
        Some(Self { m1, m2 })
    }
}

/// One library entry. Read only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MoleculeMsReference {
    /// Position in the sorted library.
    pub library_index: usize,
    pub name: String,
    pub precursor_mz: f64,
    pub adduct: String,
    pub formula: String,
    pub ontology: String,
    pub inchikey: String,
    pub smiles: String,
    pub retention_time: Option<f64>,
    pub ion_mode: Option<String>,
    pub comment: String,
    /// Sorted by m/z.
    pub spectrum: Vec<SpectrumPeak>,
    pub isotope_ratios: Option<IsotopeRatios>,
}

/// Library sorted ascending by precursor m/z.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    entries: Vec<MoleculeMsReference>,
}

impl ReferenceLibrary {
    /// Sorts the entries (and their spectra) and reassigns the library indices.
    pub fn new(mut entries: Vec<MoleculeMsReference>) -> Self {
        entries.sort_by(|a, b| a.precursor_mz.total_cmp(&b.precursor_mz));
        for (i, e) in entries.iter_mut().enumerate() {
            e.library_index = i;
            e.spectrum.sort_by(|a, b| a.mz.total_cmp(&b.mz));
            if e.isotope_ratios.is_none() && !e.formula.is_empty() {
                e.isotope_ratios = IsotopeRatios::from_formula(&e.formula);
            }
        }
        Self { entries }
    }

    pub fn as_slice(&self) -> &[MoleculeMsReference] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MoleculeMsReference> {
        self.entries.get(index)
    }
}
