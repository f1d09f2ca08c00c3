pub mod averagine;
pub mod isotope_list;

pub use averagine::{
    Averagine,
    IsotopeEnvelopeSource,
};
pub use isotope_list::{
    IsotopeEntry,
    IsotopeList,
};
