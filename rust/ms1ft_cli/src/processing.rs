use super::config::{
    InputConfig,
    OutputConfig,
};
use crate::errors::CliError;
use ms1ft::errors::Result;
use ms1ft::{
    FeatureCluster,
    FeatureFinder,
    FeatureFinderConfig,
    FeatureParquetWriter,
    FeatureSink,
    FeatureTsvWriter,
    SweepSummary,
};
use ms1query::serde::read_spectra;
use ms1query::{
    InMemoryRun,
    SpectrumSource,
};
use std::time::Instant;
use tracing::info;

const PARQUET_ROW_GROUP_SIZE: usize = 20_000;

/// Writes every feature to each of the enabled tables.
struct FeatureWriters {
    tsv: Option<FeatureTsvWriter>,
    parquet: Option<FeatureParquetWriter>,
}

impl FeatureWriters {
    fn new(output: &OutputConfig) -> Result<Self> {
        let tsv = if output.format.writes_tsv() {
            let path = output.directory.join("features.tsv");
            info!("Writing features to {}", path.display());
            Some(FeatureTsvWriter::new(path)?)
        } else {
            None
        };
        let parquet = if output.format.writes_parquet() {
            let path = output.directory.join("features.parquet");
            info!("Writing features to {}", path.display());
            Some(FeatureParquetWriter::new(path, PARQUET_ROW_GROUP_SIZE)?)
        } else {
            None
        };
        Ok(Self { tsv, parquet })
    }

    fn close(self) -> Result<()> {
        if let Some(tsv) = self.tsv {
            tsv.close()?;
        }
        if let Some(parquet) = self.parquet {
            parquet.close()?;
        }
        Ok(())
    }
}

impl FeatureSink for FeatureWriters {
    fn write_feature(&mut self, feature_id: u32, feature: &FeatureCluster) -> Result<()> {
        if let Some(tsv) = self.tsv.as_mut() {
            tsv.write_feature(feature_id, feature)?;
        }
        if let Some(parquet) = self.parquet.as_mut() {
            parquet.write_feature(feature_id, feature)?;
        }
        Ok(())
    }
}

pub fn load_run(input: &InputConfig) -> std::result::Result<InMemoryRun, CliError> {
    match input {
        InputConfig::SpectraJson { path } => {
            info!("Loading spectra from {}", path.display());
            let st = Instant::now();
            let run = InMemoryRun::from_spectra(read_spectra(path)?)?;
            info!(
                "Loaded {} spectra in {:?} ({} MS1 scans)",
                run.len(),
                st.elapsed(),
                run.ms1_scan_numbers().len()
            );
            Ok(run)
        }
    }
}

pub fn process_run(
    run: &InMemoryRun,
    analysis: &FeatureFinderConfig,
    output: &OutputConfig,
) -> std::result::Result<SweepSummary, CliError> {
    let finder = FeatureFinder::new(run, analysis.clone())?;
    let mut writers = FeatureWriters::new(output)?;
    let summary = finder.extract_features(&mut writers)?;
    writers.close()?;
    Ok(summary)
}
