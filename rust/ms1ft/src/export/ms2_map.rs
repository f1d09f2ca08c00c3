use super::record::FeatureRecord;
use super::tsv::read_feature_table;
use crate::errors::Result;
use crate::finder::fragmentation_scans_within;
use crate::isotopes::{
    Averagine,
    IsotopeEnvelopeSource,
};
use ms1query::{
    SpectrumSource,
    Tolerance,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
struct MappedFeature {
    mono_mass: f64,
    ms2_scans: Vec<u32>,
}

/// Links the features of a feature table to the MS2 scans that fragmented them.
///
/// Used to restrict a database search: a sequence mass is only matched
/// against the MS2 scans of features with that mass, and an MS2 scan only
/// against the masses of the features it fragmented.
#[derive(Debug, Clone)]
pub struct FeatureMs2Map {
    tolerance: Tolerance,
    // Sorted by mass.
    features: Vec<MappedFeature>,
    scan_to_masses: HashMap<u32, Vec<f64>>,
}

fn most_abundant_index(averagine: &Averagine, mass: f64) -> u32 {
    averagine
        .approximate_envelope(mass)
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}

impl FeatureMs2Map {
    /// Features below `min_probability` are ignored.
    pub fn from_records<S: SpectrumSource + ?Sized>(
        run: &S,
        records: &[FeatureRecord],
        tolerance: Tolerance,
        min_probability: f64,
    ) -> Self {
        let averagine = Averagine::new();
        let mut features: Vec<MappedFeature> = records
            .iter()
            .filter(|r| r.probability >= min_probability && r.min_charge > 0)
            .map(|r| MappedFeature {
                mono_mass: r.mono_mass,
                ms2_scans: fragmentation_scans_within(
                    run,
                    r.mono_mass,
                    most_abundant_index(&averagine, r.mono_mass),
                    r.min_charge..=r.max_charge,
                    (r.min_scan, r.max_scan),
                ),
            })
            .collect();
        features.sort_by(|a, b| a.mono_mass.total_cmp(&b.mono_mass));

        let mut scan_to_masses: HashMap<u32, Vec<f64>> = HashMap::new();
        for feature in features.iter() {
            for &scan in feature.ms2_scans.iter() {
                scan_to_masses.entry(scan).or_default().push(feature.mono_mass);
            }
        }
        info!("{}/{} features loaded", features.len(), records.len());
        Self {
            tolerance,
            features,
            scan_to_masses,
        }
    }

    pub fn from_feature_file<S: SpectrumSource + ?Sized>(
        run: &S,
        path: impl AsRef<Path>,
        tolerance: Tolerance,
        min_probability: f64,
    ) -> Result<Self> {
        let records = read_feature_table(path)?;
        Ok(Self::from_records(run, &records, tolerance, min_probability))
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// MS2 scans of every feature whose mass matches `sequence_mass`, ascending.
    pub fn matching_ms2_scan_numbers(&self, sequence_mass: f64) -> Vec<u32> {
        let range = self.tolerance.mz_range(sequence_mass);
        let start = self
            .features
            .partition_point(|f| f.mono_mass < range.start());
        let mut out: Vec<u32> = self.features[start..]
            .iter()
            .take_while(|f| f.mono_mass <= range.end())
            .flat_map(|f| f.ms2_scans.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Masses of the features fragmented by an MS2 scan, ascending.
    pub fn matching_masses(&self, ms2_scan_number: u32) -> &[f64] {
        self.scan_to_masses
            .get(&ms2_scan_number)
            .map(|x| x.as_slice())
            .unwrap_or(&[])
    }
}
