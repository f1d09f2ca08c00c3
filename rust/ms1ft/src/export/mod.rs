pub mod ms2_map;
pub mod record;
pub mod tsv;

pub use ms2_map::FeatureMs2Map;
pub use record::{
    FeatureParquetWriter,
    FeatureRecord,
};
pub use tsv::{
    read_feature_table,
    FeatureTsvWriter,
};
