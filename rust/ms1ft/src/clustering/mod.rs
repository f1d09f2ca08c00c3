pub mod cluster;
pub mod finder;

pub use cluster::{
    EnvelopePeak,
    FeatureCluster,
    ObservedEnvelope,
    Representative,
};
pub use finder::ClusterFinder;
