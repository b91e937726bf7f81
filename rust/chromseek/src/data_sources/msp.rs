//! MSP (NIST style) full spectrum library reader.
//!
//! Records are blocks of `KEY: value` lines followed by `Num Peaks: n` and
//! the peak lines, separated by blank lines.

use chromquery::SpectrumPeak;
use regex::Regex;
use std::io::{
    BufRead,
    BufReader,
};
use std::path::{
    Path,
    PathBuf,
};
use std::sync::LazyLock;
use tracing::{
    info,
    warn,
};

use crate::errors::LibraryReadingError;
use crate::models::{
    MoleculeMsReference,
    ReferenceLibrary,
};

/// One `mz intensity` pair, lines can hold several of them separated by `;`.
static PEAK_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?)[\s,:]+([0-9]+(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?)")
        .expect("Valid regex")
});

#[derive(Default)]
struct RecordBuilder {
    entry: MoleculeMsReference,
    has_precursor: bool,
    num_peaks: Option<usize>,
    first_line: usize,
}

impl RecordBuilder {
    fn is_empty(&self) -> bool {
        self.first_line == 0
    }

    fn set_field(&mut self, key: &str, value: &str, line: usize) -> Result<(), LibraryReadingError> {
        let value = value.trim();
        let parse_f64 = |v: &str| {
            v.parse::<f64>().map_err(|e| LibraryReadingError::MspParsingError {
                line,
                msg: format!("invalid number '{}' for {}: {}", v, key, e),
            })
        };
        match key.trim().to_ascii_uppercase().as_str() {
            "NAME" => self.entry.name = value.to_string(),
            "PRECURSORMZ" => {
                self.entry.precursor_mz = parse_f64(value)?;
                self.has_precursor = true;
            }
            "PRECURSORTYPE" => self.entry.adduct = value.to_string(),
            "FORMULA" => self.entry.formula = value.to_string(),
            "ONTOLOGY" => self.entry.ontology = value.to_string(),
            "INCHIKEY" => self.entry.inchikey = value.to_string(),
            "SMILES" => self.entry.smiles = value.to_string(),
            "RETENTIONTIME" | "RT" => {
                // Some exporters write a placeholder instead of leaving it out
                self.entry.retention_time = value.parse::<f64>().ok().filter(|x| *x >= 0.0);
            }
            "IONMODE" => self.entry.ion_mode = Some(value.to_string()),
            "COMMENT" => self.entry.comment = value.to_string(),
            "NUM PEAKS" => {
                let n = value.parse::<usize>().map_err(|e| LibraryReadingError::MspParsingError {
                    line,
                    msg: format!("invalid peak count '{}': {}", value, e),
                })?;
                self.num_peaks = Some(n);
            }
            _ => {}
        }
        Ok(())
    }

    fn add_peaks(&mut self, text: &str) {
        for cap in PEAK_PAIR.captures_iter(text) {
            if let (Ok(mz), Ok(intensity)) = (cap[1].parse::<f64>(), cap[2].parse::<f64>()) {
                self.entry.spectrum.push(SpectrumPeak::new(mz, intensity));
            }
        }
    }

    fn peaks_pending(&self) -> bool {
        self.num_peaks
            .is_some_and(|n| self.entry.spectrum.len() < n)
    }

    fn finish(self) -> Result<MoleculeMsReference, LibraryReadingError> {
        if !self.has_precursor {
            return Err(LibraryReadingError::MspParsingError {
                line: self.first_line,
                msg: format!("record '{}' has no PRECURSORMZ", self.entry.name),
            });
        }
        if let Some(n) = self.num_peaks {
            if n != self.entry.spectrum.len() {
                warn!(
                    "Record '{}' (line {}) declares {} peaks but has {}",
                    self.entry.name,
                    self.first_line,
                    n,
                    self.entry.spectrum.len()
                );
            }
        }
        Ok(self.entry)
    }
}

/// Streams the records of an MSP file.
pub struct MspReader<R: BufRead> {
    reader: R,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> MspReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for MspReader<R> {
    type Item = Result<MoleculeMsReference, LibraryReadingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut record = RecordBuilder::default();
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    return (!record.is_empty()).then(|| record.finish());
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(LibraryReadingError::FileReadingError {
                        source: e,
                        context: "Error reading MSP line",
                        path: PathBuf::new(),
                    }));
                }
            }
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if record.is_empty() {
                    continue;
                }
                return Some(record.finish());
            }
            if record.is_empty() {
                record.first_line = self.line_number;
            }
            if record.peaks_pending() {
                record.add_peaks(trimmed);
                continue;
            }
            match trimmed.split_once(':') {
                Some((key, value)) => {
                    if let Err(e) = record.set_field(key, value, self.line_number) {
                        // Skip what is left of the broken record
                        loop {
                            line.clear();
                            match self.reader.read_line(&mut line) {
                                Ok(0) | Err(_) => {
                                    self.done = true;
                                    break;
                                }
                                Ok(_) => {
                                    self.line_number += 1;
                                    if line.trim().is_empty() {
                                        break;
                                    }
                                }
                            }
                        }
                        return Some(Err(e));
                    }
                }
                None => record.add_peaks(trimmed),
            }
        }
    }
}

/// Reads and sorts a full MSP library.
pub fn read_msp_library(path: &Path) -> Result<ReferenceLibrary, LibraryReadingError> {
    let file = std::fs::File::open(path).map_err(|e| LibraryReadingError::FileReadingError {
        source: e,
        context: "Error opening MSP library",
        path: path.to_path_buf(),
    })?;
    let entries = MspReader::new(BufReader::new(file)).collect::<Result<Vec<_>, _>>()?;
    info!("Read {} MSP records from {}", entries.len(), path.display());
    Ok(ReferenceLibrary::new(entries))
}
