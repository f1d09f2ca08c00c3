#![doc = include_str!("../README.md")]

// Declare modules
pub mod errors;
pub mod models;
pub mod serde;
pub mod traits;
pub mod utils;

// Re-export main structures
pub use crate::models::claims::PeakClaims;
pub use crate::models::mass_binning::MassBinning;
pub use crate::models::peak::Peak;
pub use crate::models::peak_index::{
    IndexedPeak,
    PeakIndex,
    PeakIndexStats,
};
pub use crate::models::run::InMemoryRun;
pub use crate::models::spectrum::{
    IsolationWindow,
    Spectrum,
};
pub use crate::models::tolerance::Tolerance;
pub use crate::traits::SpectrumSource;
pub use crate::utils::TupleRange;

// Re-export errors
pub use crate::errors::{
    DataProcessingError,
    DataReadingError,
    Ms1QueryError,
};
