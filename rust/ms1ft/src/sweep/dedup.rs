use super::FeatureSink;
use crate::clustering::FeatureCluster;
use crate::config::FeatureFinderConfig;
use crate::errors::Result;
use ms1query::{
    MassBinning,
    PeakClaims,
    Tolerance,
};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use tracing::trace;

// Isotope mis-assignments looked at when collapsing masses, in Da.
const COLLAPSE_OFFSETS: [f64; 4] = [-2.0, -1.0, 1.0, 2.0];
// Furthest mass a newcomer can be merged with, in Da (tolerance excluded).
const MAX_LOOK_BACK: f64 = 2.0;

#[derive(Debug)]
struct AcceptedFeature {
    owner: NonZeroU32,
    cluster: FeatureCluster,
}

/// Merges features found for neighbouring mass bins and decides which ones
/// get written.
///
/// Bins have to be added in increasing order. Features of a bin can only be
/// merged with those of bins already added, and bins more than
/// [MAX_LOOK_BACK] Da below the latest bin are flushed to the sink.
pub struct FeatureDeduplicator<'a> {
    binning: MassBinning,
    bin_bounds: (u32, u32),
    tolerance: Tolerance,
    mass_collapse: bool,
    probability_threshold: f64,
    claims: &'a PeakClaims,
    bins: BTreeMap<u32, Vec<AcceptedFeature>>,
    num_accepted: u32,
    num_written: u32,
}

/// Whether `newcomer` and `neighbour` are the same feature. If so, the less
/// probable one is deactivated and the other takes over its bounding box.
fn merge_with_neighbour(
    newcomer: &mut FeatureCluster,
    neighbour: &mut FeatureCluster,
    tolerance: &Tolerance,
    mass_collapse: bool,
) -> bool {
    if !newcomer.overlaps(neighbour) {
        return false;
    }
    let mass_tolerance = tolerance.tolerance_as_da(newcomer.mono_mass());
    let diff = (newcomer.mono_mass() - neighbour.mono_mass()).abs();
    let same_mass = diff < mass_tolerance
        || (mass_collapse
            && ((diff - 1.0).abs() < mass_tolerance || (diff - 2.0).abs() < mass_tolerance));
    if !same_mass {
        return false;
    }

    if neighbour.is_active() {
        if neighbour.probability() > newcomer.probability() {
            neighbour.absorb_bounds(newcomer);
            newcomer.deactivate();
        } else {
            newcomer.absorb_bounds(neighbour);
            neighbour.deactivate();
        }
    }
    true
}

impl<'a> FeatureDeduplicator<'a> {
    pub fn new(config: &FeatureFinderConfig, claims: &'a PeakClaims) -> Self {
        let binning = config.mass_binning();
        Self {
            bin_bounds: (
                binning.bin_number(config.min_mass),
                binning.bin_number(config.max_mass),
            ),
            binning,
            tolerance: config.tolerance,
            mass_collapse: config.mass_collapse,
            probability_threshold: config.probability_threshold,
            claims,
            bins: BTreeMap::new(),
            num_accepted: 0,
            num_written: 0,
        }
    }

    pub fn num_written(&self) -> u32 {
        self.num_written
    }

    fn neighbour_bins(&self, bin: u32) -> Vec<u32> {
        let (min_bin, max_bin) = self.bin_bounds;
        let mut out = Vec::with_capacity(2 + COLLAPSE_OFFSETS.len());
        if bin > min_bin {
            out.push(bin - 1);
        }
        if bin < max_bin {
            out.push(bin + 1);
        }
        if self.mass_collapse {
            let mass = self.binning.bin_center(bin);
            for offset in COLLAPSE_OFFSETS {
                let other = self.binning.bin_number(mass + offset);
                if (min_bin..=max_bin).contains(&other) && other != bin && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        out
    }

    /// Adds the scored features of a mass bin.
    ///
    /// Features below the probability threshold that are not GoodEnough are
    /// dropped. A newcomer is merged with the first matching feature of a
    /// neighbouring bin. Features still active afterwards claim the peaks of
    /// their major envelopes, and inherit the claims of the feature they replaced.
    pub fn add_bin(&mut self, bin: u32, clusters: Vec<FeatureCluster>) {
        let neighbours = self.neighbour_bins(bin);
        for mut cluster in clusters {
            if cluster.probability() < self.probability_threshold && !cluster.good_enough() {
                continue;
            }

            let mut replaced = None;
            'search: for neighbour_bin in neighbours.iter() {
                let Some(accepted) = self.bins.get_mut(neighbour_bin) else {
                    continue;
                };
                for neighbour in accepted.iter_mut() {
                    let was_active = neighbour.cluster.is_active();
                    if merge_with_neighbour(
                        &mut cluster,
                        &mut neighbour.cluster,
                        &self.tolerance,
                        self.mass_collapse,
                    ) {
                        if was_active && !neighbour.cluster.is_active() {
                            replaced = Some(neighbour.owner);
                        }
                        trace!(
                            "Merged feature at {:.4} Da into bin {} (survivor {:.4} Da)",
                            cluster.mono_mass(),
                            neighbour_bin,
                            if cluster.is_active() {
                                cluster.mono_mass()
                            } else {
                                neighbour.cluster.mono_mass()
                            }
                        );
                        break 'search;
                    }
                }
            }

            let owner = NonZeroU32::MIN.saturating_add(self.num_accepted);
            self.num_accepted = self.num_accepted.saturating_add(1);
            if cluster.is_active() {
                if let Some(previous) = replaced {
                    let replaced_feature = self
                        .bins
                        .values()
                        .find_map(|features| features.iter().find(|f| f.owner == previous));
                    if let Some(replaced_feature) = replaced_feature {
                        for position in replaced_feature.cluster.major_peak_positions() {
                            self.claims.transfer(position, previous, owner);
                        }
                    }
                }
                for position in cluster.major_peak_positions() {
                    self.claims.claim(position, owner);
                }
            }
            self.bins
                .entry(bin)
                .or_default()
                .push(AcceptedFeature { owner, cluster });
        }
    }

    /// Writes and forgets every bin ending below `mass`.
    pub fn flush_below(&mut self, mass: f64, sink: &mut dyn FeatureSink) -> Result<()> {
        while let Some(entry) = self.bins.first_entry() {
            if self.binning.bin_end(*entry.key()) >= mass {
                break;
            }
            for feature in entry.remove() {
                let cluster = &feature.cluster;
                if !cluster.is_active() {
                    continue;
                }
                if cluster.good_enough() || cluster.probability() > self.probability_threshold {
                    self.num_written += 1;
                    sink.write_feature(self.num_written, cluster)?;
                }
            }
        }
        Ok(())
    }

    /// Flushes the bins no feature of `bin` or above can be merged with anymore.
    pub fn flush_behind(&mut self, bin: u32, sink: &mut dyn FeatureSink) -> Result<()> {
        let mass = self.binning.bin_start(bin);
        let look_back = MAX_LOOK_BACK + self.tolerance.tolerance_as_da(mass);
        // One extra bin for the plain bin - 1 neighbour.
        let limit = self.binning.bin_start(bin.saturating_sub(1)).min(mass - look_back);
        self.flush_below(limit, sink)
    }

    pub fn flush_all(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        self.flush_below(f64::INFINITY, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::Representative;
    use crate::isotopes::{
        Averagine,
        IsotopeList,
    };
    use ms1query::TupleRange;
    use std::sync::Arc;

    fn feature(mass: f64, cols: (u32, u32), probability: f64) -> FeatureCluster {
        let isotopes = Arc::new(IsotopeList::build(mass, &Averagine::new(), 30, 0.1).unwrap());
        let mut cluster = FeatureCluster::new(
            isotopes,
            (0..50).map(|i| 100 + i).collect::<Vec<u32>>().into(),
            TupleRange::try_new(4, 8).unwrap(),
            TupleRange::try_new(cols.0, cols.1).unwrap(),
            Representative {
                mass,
                charge: 5,
                mz: mass / 5.0,
                scan_number: 100 + cols.0,
            },
        );
        cluster.probability = probability;
        cluster.good_enough = true;
        cluster
    }

    fn collapsing_config() -> FeatureFinderConfig {
        FeatureFinderConfig {
            mass_collapse: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_isotope_leak_is_merged() {
        let config = collapsing_config();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin_a = binning.bin_number(10_000.0);
        let mass_a = binning.bin_center(bin_a);
        let bin_b = binning.bin_number(mass_a + 1.0);
        let mass_b = binning.bin_center(bin_b);
        assert_eq!(binning.bin_number(mass_b - 1.0), bin_a);

        dedup.add_bin(bin_a, vec![feature(mass_a, (10, 20), 0.6)]);
        dedup.add_bin(bin_b, vec![feature(mass_b, (15, 30), 0.9)]);

        let mut sink: Vec<FeatureCluster> = Vec::new();
        dedup.flush_all(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        let survivor = &sink[0];
        assert_eq!(survivor.probability(), 0.9);
        assert_eq!(survivor.mono_mass(), mass_b);
        // The survivor took over the bounding box of the merged feature.
        assert_eq!(survivor.col_range().as_tuple(), (10, 30));
    }

    #[test]
    fn test_more_probable_neighbour_survives() {
        let config = collapsing_config();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin_a = binning.bin_number(10_000.0);
        let mass_a = binning.bin_center(bin_a);
        let bin_b = binning.bin_number(mass_a + 1.0);
        dedup.add_bin(bin_a, vec![feature(mass_a, (10, 20), 0.95)]);
        dedup.add_bin(bin_b, vec![feature(binning.bin_center(bin_b), (15, 30), 0.7)]);

        let mut sink: Vec<FeatureCluster> = Vec::new();
        dedup.flush_all(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].mono_mass(), mass_a);
        assert_eq!(sink[0].col_range().as_tuple(), (10, 30));
    }

    #[test]
    fn test_without_collapse_isotope_leak_is_kept() {
        let config = FeatureFinderConfig::default();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin_a = binning.bin_number(10_000.0);
        let mass_a = binning.bin_center(bin_a);
        let bin_b = binning.bin_number(mass_a + 1.0);
        dedup.add_bin(bin_a, vec![feature(mass_a, (10, 20), 0.6)]);
        dedup.add_bin(bin_b, vec![feature(binning.bin_center(bin_b), (15, 30), 0.9)]);

        let mut sink: Vec<FeatureCluster> = Vec::new();
        dedup.flush_all(&mut sink).unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_adjacent_bins_and_disjoint_boxes() {
        let config = FeatureFinderConfig::default();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin = binning.bin_number(10_000.0);
        let mass = binning.bin_center(bin);
        dedup.add_bin(bin, vec![feature(mass, (10, 20), 0.8)]);
        // Same mass, same scans: merged.
        dedup.add_bin(bin + 1, vec![
            feature(mass + 0.01, (12, 18), 0.7),
            // Same mass, other scans: a separate feature.
            feature(mass + 0.01, (30, 40), 0.7),
        ]);

        let mut sink: Vec<FeatureCluster> = Vec::new();
        dedup.flush_all(&mut sink).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].probability(), 0.8);
        assert_eq!(sink[1].col_range().as_tuple(), (30, 40));
    }

    #[test]
    fn test_flush_keeps_recent_bins() {
        let config = FeatureFinderConfig::default();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin = binning.bin_number(10_000.0);
        dedup.add_bin(bin, vec![feature(binning.bin_center(bin), (10, 20), 0.8)]);
        let mut sink: Vec<FeatureCluster> = Vec::new();

        dedup.flush_behind(binning.bin_number(10_001.0), &mut sink).unwrap();
        assert!(sink.is_empty());
        dedup.flush_behind(binning.bin_number(10_003.0), &mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(dedup.num_written(), 1);
    }

    #[test]
    fn test_low_probability_features_are_dropped() {
        let config = FeatureFinderConfig::default();
        let binning = config.mass_binning();
        let claims = PeakClaims::new(0);
        let mut dedup = FeatureDeduplicator::new(&config, &claims);

        let bin = binning.bin_number(10_000.0);
        let mut weak = feature(binning.bin_center(bin), (10, 20), 0.2);
        weak.good_enough = false;
        dedup.add_bin(bin, vec![weak]);
        let mut sink: Vec<FeatureCluster> = Vec::new();
        dedup.flush_all(&mut sink).unwrap();
        assert!(sink.is_empty());
    }
}
