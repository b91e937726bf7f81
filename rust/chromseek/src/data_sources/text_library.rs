//! Tab separated precursor only library.
//!
//! Needs a header with at least `name` and `precursor_mz`, the `rt`,
//! `adduct`, `formula`, `inchikey` and `smiles` columns are optional.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::errors::LibraryReadingError;
use crate::models::{
    MoleculeMsReference,
    ReferenceLibrary,
};

#[derive(Debug, Deserialize)]
struct TextLibraryRow {
    #[serde(alias = "Name", alias = "NAME")]
    name: String,
    #[serde(alias = "PrecursorMz", alias = "PRECURSORMZ", alias = "mz")]
    precursor_mz: f64,
    #[serde(default, alias = "RT", alias = "retention_time")]
    rt: Option<f64>,
    #[serde(default, alias = "Adduct")]
    adduct: Option<String>,
    #[serde(default, alias = "Formula")]
    formula: Option<String>,
    #[serde(default, alias = "InChIKey")]
    inchikey: Option<String>,
    #[serde(default, alias = "SMILES")]
    smiles: Option<String>,
}

impl From<TextLibraryRow> for MoleculeMsReference {
    fn from(row: TextLibraryRow) -> Self {
        MoleculeMsReference {
            name: row.name,
            precursor_mz: row.precursor_mz,
            retention_time: row.rt,
            adduct: row.adduct.unwrap_or_default(),
            formula: row.formula.unwrap_or_default(),
            inchikey: row.inchikey.unwrap_or_default(),
            smiles: row.smiles.unwrap_or_default(),
            ..Default::default()
        }
    }
}

const REQUIRED_COLUMNS: [(&str, &[&str]); 2] = [
    ("name", &["name", "Name", "NAME"]),
    ("precursor_mz", &["precursor_mz", "PrecursorMz", "PRECURSORMZ", "mz"]),
];

pub fn read_text_library(path: &Path) -> Result<ReferenceLibrary, LibraryReadingError> {
    let text_err = |source: csv::Error| LibraryReadingError::TextLibraryError {
        source,
        path: path.to_path_buf(),
    };
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(text_err)?;

    let headers = rdr.headers().map_err(text_err)?.clone();
    for (column, aliases) in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| aliases.contains(&h.trim())) {
            return Err(LibraryReadingError::MissingColumn {
                column,
                path: path.to_path_buf(),
            });
        }
    }

    let mut entries = Vec::new();
    for result in rdr.deserialize() {
        let row: TextLibraryRow = result.map_err(text_err)?;
        entries.push(row.into());
    }
    info!("Read {} text library entries from {}", entries.len(), path.display());
    Ok(ReferenceLibrary::new(entries))
}
