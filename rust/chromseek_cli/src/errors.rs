use chromseek::errors::LibraryReadingError;
use chromseek::serde::StoreError;

#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    Processing {
        source: String,
    },
    Cancelled,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing config: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::Processing { source } => write!(f, "Error processing data: {}", source),
            CliError::Cancelled => write!(f, "Processing was cancelled"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<chromseek::ChromSeekError> for CliError {
    fn from(e: chromseek::ChromSeekError) -> Self {
        CliError::Processing {
            source: e.to_string(),
        }
    }
}

impl From<LibraryReadingError> for CliError {
    fn from(e: LibraryReadingError) -> Self {
        CliError::Io {
            source: e.to_string(),
            path: None,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Io {
            source: e.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::ParseError { msg: e.to_string() }
    }
}
