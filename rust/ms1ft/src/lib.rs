#![doc = include_str!("../README.md")]

pub mod clustering;
pub mod config;
pub mod errors;
pub mod export;
pub mod finder;
pub mod isotopes;
pub mod matrix;
pub mod scoring;
pub mod sweep;
pub mod utils;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use clustering::FeatureCluster;
pub use config::{
    ClusteringParams,
    FeatureFinderConfig,
};
pub use errors::FeatureFindingError;
pub use export::{
    read_feature_table,
    FeatureMs2Map,
    FeatureParquetWriter,
    FeatureRecord,
    FeatureTsvWriter,
};
pub use finder::FeatureFinder;
pub use isotopes::{
    Averagine,
    IsotopeList,
};
pub use scoring::ScoreKind;
pub use sweep::{
    FeatureSink,
    SweepSummary,
};
