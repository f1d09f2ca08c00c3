use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Ms1QueryError {
    DataReadingError(DataReadingError),
    DataProcessingError(DataProcessingError),
    Other(String),
}

impl Display for Ms1QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Ms1QueryError {
    pub fn custom(msg: impl Display) -> Self {
        Self::Other(msg.to_string())
    }
}

#[derive(Debug)]
pub enum DataReadingError {
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Json(serde_json::Error),
    InvalidSpectrum {
        scan_number: u32,
        reason: String,
    },
    DuplicateScan(u32),
}

impl Display for DataReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "Error reading file {}: {}", path.display(), source),
                None => write!(f, "Error reading file: {}", source),
            },
            Self::Json(e) => write!(f, "Error decoding spectra: {}", e),
            Self::InvalidSpectrum {
                scan_number,
                reason,
            } => write!(f, "Invalid spectrum at scan {}: {}", scan_number, reason),
            Self::DuplicateScan(scan_number) => {
                write!(f, "Scan number {} appears more than once", scan_number)
            }
        }
    }
}

impl From<serde_json::Error> for DataReadingError {
    fn from(e: serde_json::Error) -> Self {
        DataReadingError::Json(e)
    }
}

impl From<std::io::Error> for DataReadingError {
    fn from(e: std::io::Error) -> Self {
        DataReadingError::Io {
            source: e,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedNonEmptyData,
    ExpectedSlicesSameLength { expected: usize, other: usize },
    ScanNotFound(u32),
    PeakIndexOutOfBounds(usize),
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<DataProcessingError> for Ms1QueryError {
    fn from(e: DataProcessingError) -> Self {
        Ms1QueryError::DataProcessingError(e)
    }
}

impl From<DataReadingError> for Ms1QueryError {
    fn from(e: DataReadingError) -> Self {
        Ms1QueryError::DataReadingError(e)
    }
}
