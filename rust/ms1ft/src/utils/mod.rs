pub mod correlation;
pub mod divergence;
pub mod ion;
