use chromquery::{
    ChromqueryError,
    DataReadingError,
};
use std::path::PathBuf;

use crate::serde::msdec_store::StoreError;

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
}

#[derive(Debug)]
pub enum LibraryReadingError {
    FileReadingError {
        source: std::io::Error,
        context: &'static str,
        path: PathBuf,
    },
    MspParsingError {
        line: usize,
        msg: String,
    },
    TextLibraryError {
        source: csv::Error,
        path: PathBuf,
    },
    MissingColumn {
        column: &'static str,
        path: PathBuf,
    },
}

impl std::fmt::Display for LibraryReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileReadingError {
                source,
                context,
                path,
            } => write!(f, "{} ({}): {}", context, path.display(), source),
            Self::MspParsingError { line, msg } => {
                write!(f, "Unable to parse MSP line {}: {}", line, msg)
            }
            Self::TextLibraryError { source, path } => {
                write!(f, "Error reading text library {}: {}", path.display(), source)
            }
            Self::MissingColumn { column, path } => {
                write!(f, "Missing column '{}' in {}", column, path.display())
            }
        }
    }
}

#[derive(Debug)]
pub enum ChromSeekError {
    Chromquery(ChromqueryError),
    ParseError {
        msg: String,
    },
    DataProcessingError(DataProcessingError),
    LibraryReadingError(LibraryReadingError),
    Store(StoreError),
    ThreadPool {
        msg: String,
    },
}

impl std::fmt::Display for ChromSeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chromquery(e) => write!(f, "{}", e),
            Self::LibraryReadingError(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "{}", e),
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for ChromSeekError {}

pub type Result<T> = std::result::Result<T, ChromSeekError>;

impl From<ChromqueryError> for ChromSeekError {
    fn from(x: ChromqueryError) -> Self {
        Self::Chromquery(x)
    }
}

impl From<DataReadingError> for ChromSeekError {
    fn from(x: DataReadingError) -> Self {
        Self::Chromquery(ChromqueryError::DataReadingError(x))
    }
}

impl From<serde_json::Error> for ChromSeekError {
    fn from(val: serde_json::Error) -> Self {
        ChromSeekError::ParseError {
            msg: val.to_string(),
        }
    }
}

impl From<DataProcessingError> for ChromSeekError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessingError(x)
    }
}

impl From<LibraryReadingError> for ChromSeekError {
    fn from(x: LibraryReadingError) -> Self {
        Self::LibraryReadingError(x)
    }
}

impl From<StoreError> for ChromSeekError {
    fn from(x: StoreError) -> Self {
        Self::Store(x)
    }
}

impl From<rayon::ThreadPoolBuildError> for ChromSeekError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool { msg: x.to_string() }
    }
}
