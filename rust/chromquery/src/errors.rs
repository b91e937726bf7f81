use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ChromqueryError {
    DataReadingError(DataReadingError),
}

impl Display for ChromqueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataReadingError(e) => write!(f, "Error reading data: {}", e),
        }
    }
}

impl std::error::Error for ChromqueryError {}

#[derive(Debug)]
pub enum DataReadingError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    Json {
        source: serde_json::Error,
        line: usize,
    },
    MessagePack {
        source: rmp_serde::decode::Error,
        record: usize,
    },
    UnsupportedDataError(UnsupportedDataError),
}

impl Display for DataReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => write!(f, "I/O error on {}: {}", path.display(), source),
            Self::Json { source, line } => write!(f, "Invalid JSON on line {}: {}", line, source),
            Self::MessagePack { source, record } => {
                write!(f, "Invalid MessagePack record {}: {}", record, source)
            }
            Self::UnsupportedDataError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DataReadingError {}

impl From<UnsupportedDataError> for DataReadingError {
    fn from(e: UnsupportedDataError) -> Self {
        DataReadingError::UnsupportedDataError(e)
    }
}

#[derive(Debug)]
pub enum UnsupportedDataError {
    UnknownFormat { path: PathBuf },
    UnsortedPeaks { scan_index: usize },
}

impl Display for UnsupportedDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFormat { path } => {
                write!(f, "Unable to detect the format of {}", path.display())
            }
            Self::UnsortedPeaks { scan_index } => {
                write!(f, "Peaks of scan {} are not sorted by m/z", scan_index)
            }
        }
    }
}

impl<T: Into<DataReadingError>> From<T> for ChromqueryError {
    fn from(e: T) -> Self {
        ChromqueryError::DataReadingError(e.into())
    }
}
