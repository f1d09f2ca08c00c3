use ms1query::{
    DataProcessingError,
    DataReadingError,
};
use std::path::PathBuf;

#[derive(Debug)]
pub enum FeatureFindingError {
    /// The query itself can never produce features (non-positive mass,
    /// no scans, empty isotope envelope ...).
    InvalidInput {
        context: String,
    },
    NonFiniteIsotopeRatio {
        mass: f64,
        index: usize,
    },
    /// A peak or scan referenced by the matrix is not available anymore.
    MissingCollaboratorData {
        context: String,
    },
    /// Processing of one candidate mass panicked.
    Panicked {
        mass: f64,
        message: String,
    },
    DataProcessing(DataProcessingError),
    DataReading(DataReadingError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Csv(csv::Error),
    Parquet(parquet::errors::ParquetError),
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl std::fmt::Display for FeatureFindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput { context } => write!(f, "Invalid input: {}", context),
            Self::NonFiniteIsotopeRatio { mass, index } => write!(
                f,
                "Non-finite isotope ratio at index {} for mass {}",
                index, mass
            ),
            Self::MissingCollaboratorData { context } => {
                write!(f, "Missing data: {}", context)
            }
            Self::Panicked { mass, message } => {
                write!(f, "Processing of mass {} panicked: {}", mass, message)
            }
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "Error accessing file {}: {}", path.display(), source),
                None => write!(f, "Io error: {}", source),
            },
            other => write!(f, "{:?}", other),
        }
    }
}

impl FeatureFindingError {
    pub fn invalid_input(context: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
        }
    }

    pub fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeatureFindingError>;

impl From<DataProcessingError> for FeatureFindingError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<DataReadingError> for FeatureFindingError {
    fn from(x: DataReadingError) -> Self {
        Self::DataReading(x)
    }
}

impl From<std::io::Error> for FeatureFindingError {
    fn from(x: std::io::Error) -> Self {
        Self::Io {
            source: x,
            path: None,
        }
    }
}

impl From<csv::Error> for FeatureFindingError {
    fn from(x: csv::Error) -> Self {
        Self::Csv(x)
    }
}

impl From<parquet::errors::ParquetError> for FeatureFindingError {
    fn from(x: parquet::errors::ParquetError) -> Self {
        Self::Parquet(x)
    }
}

impl From<rayon::ThreadPoolBuildError> for FeatureFindingError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(x)
    }
}
