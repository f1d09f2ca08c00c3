use super::record::FeatureRecord;
use crate::clustering::FeatureCluster;
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::sweep::FeatureSink;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Tab separated feature table, one row per feature.
pub struct FeatureTsvWriter {
    writer: csv::Writer<BufWriter<File>>,
}

impl FeatureTsvWriter {
    /// Fails if the file already exists. The header is written right away,
    /// so a sweep without features still leaves a valid (empty) table.
    pub fn new(out_path: impl AsRef<Path>) -> Result<Self> {
        let path = out_path.as_ref();
        let file = File::create_new(path).map_err(|e| FeatureFindingError::io_at(e, path))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer.write_record(FeatureRecord::COLUMNS)?;
        Ok(Self { writer })
    }

    pub fn add(&mut self, record: &FeatureRecord) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl FeatureSink for FeatureTsvWriter {
    fn write_feature(&mut self, feature_id: u32, feature: &FeatureCluster) -> Result<()> {
        self.add(&FeatureRecord::from_cluster(feature_id, feature))
    }
}

/// Reads a feature table written by [FeatureTsvWriter].
pub fn read_feature_table(path: impl AsRef<Path>) -> Result<Vec<FeatureRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?;
    let mut out = Vec::new();
    for record in reader.deserialize() {
        out.push(record?);
    }
    Ok(out)
}
