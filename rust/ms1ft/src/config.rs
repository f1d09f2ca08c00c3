use crate::errors::{
    FeatureFindingError,
    Result,
};
use ms1query::{
    MassBinning,
    Tolerance,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Correlation bounds used while growing clusters over the feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    /// Minimum cell correlation to seed a cluster, and to join one
    /// further than one column away from the seed.
    pub seed_correlation: f64,
    /// Minimum cell correlation to join a cluster next to the seed column.
    pub loose_correlation: f64,
    /// Clusters whose summed envelope correlates less than this are dropped.
    pub cluster_correlation_cutoff: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            seed_correlation: 0.5,
            loose_correlation: 0.2,
            cluster_correlation_cutoff: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFinderConfig {
    pub tolerance: Tolerance,
    pub min_charge: u32,
    pub max_charge: u32,
    /// Maximum number of charge rows of the feature matrix.
    pub max_charge_length: usize,
    pub max_isotopes: usize,
    pub relative_intensity_threshold: f64,
    pub mass_bin_bits: u8,
    pub min_mass: f64,
    pub max_mass: f64,
    /// Also merge features one or two Daltons apart (isotope mis-assignment).
    pub mass_collapse: bool,
    pub probability_threshold: f64,
    /// Number of mass bins handed to the thread pool at once.
    pub chunk_size: usize,
    /// 0 uses every available core.
    pub max_threads: usize,
    pub clustering: ClusteringParams,
}

impl Default for FeatureFinderConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::Ppm(10.0),
            min_charge: 2,
            max_charge: 60,
            max_charge_length: 40,
            max_isotopes: 30,
            relative_intensity_threshold: 0.1,
            mass_bin_bits: 27,
            min_mass: 3000.0,
            max_mass: 50000.0,
            mass_collapse: false,
            probability_threshold: 0.5,
            chunk_size: 256,
            max_threads: 0,
            clustering: ClusteringParams::default(),
        }
    }
}

impl FeatureFinderConfig {
    pub fn mass_binning(&self) -> MassBinning {
        MassBinning::new(self.mass_bin_bits)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_charge == 0 || self.min_charge > self.max_charge {
            return Err(FeatureFindingError::invalid_input(format!(
                "charge range [{}, {}] is empty or contains 0",
                self.min_charge, self.max_charge
            )));
        }
        if self.max_charge_length == 0 || self.max_isotopes == 0 || self.chunk_size == 0 {
            return Err(FeatureFindingError::invalid_input(
                "max_charge_length, max_isotopes and chunk_size must be positive",
            ));
        }
        if !(self.min_mass > 0.0 && self.min_mass <= self.max_mass && self.max_mass.is_finite()) {
            return Err(FeatureFindingError::invalid_input(format!(
                "mass range [{}, {}] is not valid",
                self.min_mass, self.max_mass
            )));
        }
        if !(0.0..1.0).contains(&self.relative_intensity_threshold) {
            return Err(FeatureFindingError::invalid_input(format!(
                "relative intensity threshold {} outside of [0, 1)",
                self.relative_intensity_threshold
            )));
        }
        let tol_ok = match self.tolerance {
            Tolerance::Ppm(x) | Tolerance::Da(x) => x.is_finite() && x > 0.0,
        };
        if !tol_ok {
            return Err(FeatureFindingError::invalid_input(format!(
                "tolerance {:?} must be positive",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let conf: FeatureFinderConfig = serde_json::from_str(
            r#"{"min_mass": 5000.0, "tolerance": {"type": "da", "value": 0.01}, "clustering": {"seed_correlation": 0.6}}"#,
        )
        .unwrap();
        assert_eq!(conf.min_mass, 5000.0);
        assert_eq!(conf.max_mass, 50000.0);
        assert_eq!(conf.tolerance, Tolerance::Da(0.01));
        assert_eq!(conf.clustering.seed_correlation, 0.6);
        assert_eq!(conf.clustering.cluster_correlation_cutoff, 0.7);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut conf = FeatureFinderConfig::default();
        assert!(conf.validate().is_ok());
        conf.min_charge = 0;
        assert!(conf.validate().is_err());
        let conf = FeatureFinderConfig {
            min_mass: 10.0,
            max_mass: 5.0,
            ..Default::default()
        };
        assert!(conf.validate().is_err());
    }
}
