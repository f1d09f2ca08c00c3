use ms1ft::FeatureFindingError;
use ms1query::DataReadingError;

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
    DataReading {
        source: String,
    },
    Processing {
        source: String,
    },
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
            CliError::DataReading { source } => write!(f, "Error reading data: {}", source),
            CliError::Processing { source } => write!(f, "Error finding features: {}", source),
        }
    }
}

impl From<DataReadingError> for CliError {
    fn from(e: DataReadingError) -> Self {
        CliError::DataReading {
            source: format!("{:?}", e),
        }
    }
}

impl From<FeatureFindingError> for CliError {
    fn from(e: FeatureFindingError) -> Self {
        match e {
            FeatureFindingError::DataReading(e) => e.into(),
            other => CliError::Processing {
                source: other.to_string(),
            },
        }
    }
}
