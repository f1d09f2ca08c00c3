pub mod claims;
pub mod mass_binning;
pub mod peak;
pub mod peak_index;
pub mod run;
pub mod spectrum;
pub mod tolerance;

pub use claims::PeakClaims;
pub use mass_binning::MassBinning;
pub use peak::Peak;
pub use peak_index::{
    IndexedPeak,
    PeakIndex,
};
pub use run::InMemoryRun;
pub use spectrum::{
    IsolationWindow,
    Spectrum,
};
pub use tolerance::Tolerance;
