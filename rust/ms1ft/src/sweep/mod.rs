//! Feature extraction over the whole configured mass range.
//!
//! Mass bins are processed in chunks: every bin of a chunk is clustered and
//! scored in parallel (one [FeatureMatrix] per worker), then the chunk's
//! results are deduplicated sequentially in bin order. Peak claims only change
//! during deduplication, so a chunk is always scored against the claims of the
//! chunks before it and the output does not depend on the number of threads.

pub mod dedup;

pub use dedup::FeatureDeduplicator;

use crate::clustering::FeatureCluster;
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::finder::FeatureFinder;
use crate::matrix::{
    FeatureMatrix,
    MassQuery,
};
use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use ms1query::{
    PeakClaims,
    SpectrumSource,
};
use rayon::prelude::*;
use std::panic::{
    catch_unwind,
    AssertUnwindSafe,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    info,
    warn,
};

/// Destination of the features accepted by a sweep.
pub trait FeatureSink {
    /// `feature_id` starts at 1 and increases with every written feature.
    fn write_feature(&mut self, feature_id: u32, feature: &FeatureCluster) -> Result<()>;
}

impl FeatureSink for Vec<FeatureCluster> {
    fn write_feature(&mut self, _feature_id: u32, feature: &FeatureCluster) -> Result<()> {
        self.push(feature.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub num_bins: usize,
    pub failed_bins: usize,
    pub clusters_scored: usize,
    pub features_written: usize,
    pub claimed_peaks: usize,
    pub elapsed: Duration,
}

impl std::fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sweep Summary:")?;
        writeln!(
            f,
            "Mass bins: {} ({} failed)",
            self.num_bins, self.failed_bins
        )?;
        writeln!(f, "Clusters scored: {}", self.clusters_scored)?;
        writeln!(f, "Features written: {}", self.features_written)?;
        writeln!(f, "Claimed peaks: {}", self.claimed_peaks)?;
        writeln!(f, "Elapsed: {:.2?}", self.elapsed)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<S: SpectrumSource + ?Sized> FeatureFinder<'_, S> {
    /// Runs one bin of the sweep, turning a panic into an error of that bin.
    /// The matrix is rebuilt from scratch by the next query, so the worker
    /// can keep using it.
    fn process_bin(
        &self,
        bin: u32,
        matrix: &mut FeatureMatrix,
        claims: &PeakClaims,
    ) -> Result<Vec<FeatureCluster>> {
        let query = MassQuery::from_bin(&self.binning, bin);
        catch_unwind(AssertUnwindSafe(|| self.process_query(&query, matrix, claims)))
            .unwrap_or_else(|payload| {
                Err(FeatureFindingError::Panicked {
                    mass: query.mass,
                    message: panic_message(payload.as_ref()),
                })
            })
    }

    /// Finds, deduplicates and writes the features of every mass bin
    /// between `min_mass` and `max_mass`.
    ///
    /// A bin that fails, or panics, is logged and skipped. Only errors of
    /// the sink abort the sweep.
    pub fn extract_features(&self, sink: &mut dyn FeatureSink) -> Result<SweepSummary> {
        let start = Instant::now();
        let first_bin = self.binning.bin_number(self.config.min_mass);
        let last_bin = self.binning.bin_number(self.config.max_mass);
        let bins: Vec<u32> = (first_bin..=last_bin).collect();
        info!(
            "Extracting features from {} mass bins ({} - {} Da)",
            bins.len(),
            self.config.min_mass,
            self.config.max_mass
        );

        let claims = PeakClaims::new(self.index.len());
        let mut dedup = FeatureDeduplicator::new(&self.config, &claims);
        let mut summary = SweepSummary {
            num_bins: bins.len(),
            ..Default::default()
        };

        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        for chunk in bins
            .chunks(self.config.chunk_size)
            .progress_with_style(style)
        {
            let results: Vec<(u32, Result<Vec<FeatureCluster>>)> = self.pool.install(|| {
                chunk
                    .par_iter()
                    .map_init(
                        || FeatureMatrix::new(self.index.num_columns()),
                        |matrix, &bin| (bin, self.process_bin(bin, matrix, &claims)),
                    )
                    .collect()
            });

            for (bin, result) in results {
                match result {
                    Ok(clusters) => {
                        summary.clusters_scored += clusters.len();
                        dedup.add_bin(bin, clusters);
                    }
                    Err(e) => {
                        warn!(
                            "Skipping mass bin {} ({:.4} Da): {}",
                            bin,
                            self.binning.bin_center(bin),
                            e
                        );
                        summary.failed_bins += 1;
                    }
                }
            }
            if let Some(&last) = chunk.last() {
                dedup.flush_behind(last, sink)?;
            }
        }
        dedup.flush_all(sink)?;

        summary.features_written = dedup.num_written() as usize;
        summary.claimed_peaks = claims.num_claimed();
        summary.elapsed = start.elapsed();
        info!("{}", summary);
        Ok(summary)
    }
}
