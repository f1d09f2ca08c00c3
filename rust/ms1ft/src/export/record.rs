use crate::clustering::FeatureCluster;
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::scoring::ScoreKind;
use crate::sweep::FeatureSink;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// One exported feature. The field order is the column order of the
/// feature table and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParquetRecordWriter)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureRecord {
    #[serde(rename = "FeatureID")]
    pub feature_id: u32,
    pub min_scan: u32,
    pub max_scan: u32,
    pub min_charge: u32,
    pub max_charge: u32,
    pub mono_mass: f64,
    pub rep_scan: u32,
    pub rep_charge: u32,
    pub rep_mz: f64,
    pub abundance: f64,
    pub good_envelope_count: u32,

    pub envelope_correlation: f64,
    pub envelope_correlation_summed: f64,
    pub rank_sum: f64,
    pub poisson: f64,

    pub bhattacharyya_distance: f64,
    pub bhattacharyya_distance_summed: f64,
    pub bhattacharyya_distance_summed_over_charges: f64,
    pub bhattacharyya_distance_summed_over_times: f64,
    pub bhattacharyya_distance_summed_over_even_charges: f64,
    pub bhattacharyya_distance_summed_over_odd_charges: f64,

    pub kullback_leibler_divergence: f64,
    pub kullback_leibler_divergence_summed: f64,

    pub xic_corr_mean: f64,
    pub xic_corr_min: f64,
    pub abundance_changes_over_charges: f64,

    pub mz_error: f64,
    pub total_mz_error: f64,

    pub probability: f64,
    pub good_enough: bool,
    /// `index,intensity` pairs of the summed envelope, `;` separated.
    pub envelope: String,
}

impl FeatureRecord {
    /// Header of the feature table.
    pub const COLUMNS: [&'static str; 31] = [
        "FeatureID",
        "MinScan",
        "MaxScan",
        "MinCharge",
        "MaxCharge",
        "MonoMass",
        "RepScan",
        "RepCharge",
        "RepMz",
        "Abundance",
        "GoodEnvelopeCount",
        "EnvelopeCorrelation",
        "EnvelopeCorrelationSummed",
        "RankSum",
        "Poisson",
        "BhattacharyyaDistance",
        "BhattacharyyaDistanceSummed",
        "BhattacharyyaDistanceSummedOverCharges",
        "BhattacharyyaDistanceSummedOverTimes",
        "BhattacharyyaDistanceSummedOverEvenCharges",
        "BhattacharyyaDistanceSummedOverOddCharges",
        "KullbackLeiblerDivergence",
        "KullbackLeiblerDivergenceSummed",
        "XicCorrMean",
        "XicCorrMin",
        "AbundanceChangesOverCharges",
        "MzError",
        "TotalMzError",
        "Probability",
        "GoodEnough",
        "Envelope",
    ];

    pub fn from_cluster(feature_id: u32, cluster: &FeatureCluster) -> Self {
        use ScoreKind::*;
        let rep = cluster.representative();
        let envelope = cluster
            .envelope_pairs()
            .map(|(index, intensity)| format!("{},{:.2}", index, intensity))
            .collect::<Vec<_>>()
            .join(";");
        Self {
            feature_id,
            min_scan: cluster.min_scan(),
            max_scan: cluster.max_scan(),
            min_charge: cluster.min_charge(),
            max_charge: cluster.max_charge(),
            mono_mass: cluster.mono_mass(),
            rep_scan: rep.scan_number,
            rep_charge: rep.charge,
            rep_mz: rep.mz,
            abundance: cluster.abundance(),
            good_envelope_count: cluster.good_envelope_count() as u32,
            envelope_correlation: cluster.score(EnvelopeCorrelation),
            envelope_correlation_summed: cluster.score(EnvelopeCorrelationSummed),
            rank_sum: cluster.score(RankSum),
            poisson: cluster.score(Poisson),
            bhattacharyya_distance: cluster.score(BhattacharyyaDistance),
            bhattacharyya_distance_summed: cluster.score(BhattacharyyaDistanceSummed),
            bhattacharyya_distance_summed_over_charges: cluster
                .score(BhattacharyyaDistanceSummedOverCharges),
            bhattacharyya_distance_summed_over_times: cluster
                .score(BhattacharyyaDistanceSummedOverTimes),
            bhattacharyya_distance_summed_over_even_charges: cluster
                .score(BhattacharyyaDistanceSummedOverEvenCharges),
            bhattacharyya_distance_summed_over_odd_charges: cluster
                .score(BhattacharyyaDistanceSummedOverOddCharges),
            kullback_leibler_divergence: cluster.score(KullbackLeiblerDivergence),
            kullback_leibler_divergence_summed: cluster.score(KullbackLeiblerDivergenceSummed),
            xic_corr_mean: cluster.score(XicCorrMean),
            xic_corr_min: cluster.score(XicCorrMin),
            abundance_changes_over_charges: cluster.score(AbundanceChangesOverCharges),
            mz_error: cluster.score(MzError),
            total_mz_error: cluster.score(TotalMzError),
            probability: cluster.probability(),
            good_enough: cluster.good_enough(),
            envelope,
        }
    }
}

pub struct FeatureParquetWriter {
    row_group_size: usize,
    writer: SerializedFileWriter<File>,
    buffer: Vec<FeatureRecord>,
}

impl FeatureParquetWriter {
    /// Fails if the file already exists.
    pub fn new(out_path: impl AsRef<Path>, row_group_size: usize) -> Result<Self> {
        let file = match File::create_new(out_path.as_ref()) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(
                    "Failed to open file {:?} with error: {}",
                    out_path.as_ref(),
                    err
                );
                return Err(FeatureFindingError::io_at(err, out_path.as_ref()));
            }
        };
        let records: &[FeatureRecord] = &[];
        let schema = records.schema()?;
        let writer = SerializedFileWriter::new(file, schema, Default::default())?;
        Ok(Self {
            buffer: Vec::with_capacity(row_group_size),
            writer,
            row_group_size: row_group_size.max(1),
        })
    }

    fn flush_to_file(&mut self) -> Result<()> {
        debug!("Flushing {} features to file", self.buffer.len());
        let mut row_group = self.writer.next_row_group()?;
        self.buffer.as_slice().write_to_row_group(&mut row_group)?;
        row_group.close()?;
        self.buffer.clear();
        Ok(())
    }

    pub fn add(&mut self, record: FeatureRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.row_group_size {
            self.flush_to_file()?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.flush_to_file()?;
        }
        self.writer.close()?;
        Ok(())
    }
}

impl FeatureSink for FeatureParquetWriter {
    fn write_feature(&mut self, feature_id: u32, feature: &FeatureCluster) -> Result<()> {
        self.add(FeatureRecord::from_cluster(feature_id, feature))
    }
}
