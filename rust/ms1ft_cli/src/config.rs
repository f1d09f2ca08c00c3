use ms1ft::FeatureFinderConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub analysis: FeatureFinderConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum InputConfig {
    #[serde(rename = "spectra_json")]
    SpectraJson { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tsv,
    Parquet,
    Both,
}

impl OutputFormat {
    pub fn writes_tsv(&self) -> bool {
        matches!(self, Self::Tsv | Self::Both)
    }

    pub fn writes_parquet(&self) -> bool {
        matches!(self, Self::Parquet | Self::Both)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Reads the config file (if any) and applies the command line overrides on top.
    pub fn with_cli_args(args: Cli) -> Result<Self, CliError> {
        let mut config = match args.config {
            Some(ref path) => {
                let file = std::fs::File::open(path).map_err(|e| CliError::Io {
                    source: e.to_string(),
                    path: Some(path.to_string_lossy().to_string()),
                })?;
                serde_json::from_reader(file)
                    .map_err(|e| CliError::ParseError { msg: e.to_string() })?
            }
            None => Config::default(),
        };

        if let Some(path) = args.input {
            config.input = Some(InputConfig::SpectraJson { path });
        }
        if let Some(directory) = args.output_dir {
            let format = config.output.as_ref().map(|x| x.format).unwrap_or_default();
            config.output = Some(OutputConfig { directory, format });
        }
        if let Some(min_mass) = args.min_mass {
            config.analysis.min_mass = min_mass;
        }
        if let Some(max_mass) = args.max_mass {
            config.analysis.max_mass = max_mass;
        }
        if let Some(threads) = args.threads {
            config.analysis.max_threads = threads;
        }
        if args.mass_collapse {
            config.analysis.mass_collapse = true;
        }

        if config.input.is_none() {
            return Err(CliError::Config {
                source: "No input provided, please provide one in either the config file or with the --input flag".to_string(),
            });
        }
        if config.output.is_none() {
            return Err(CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
        config
            .analysis
            .validate()
            .map_err(|e| CliError::Config {
                source: e.to_string(),
            })?;
        Ok(config)
    }
}
