use super::cluster::{
    FeatureCluster,
    Representative,
};
use crate::config::ClusteringParams;
use crate::isotopes::IsotopeList;
use crate::matrix::{
    FeatureCell,
    FeatureMatrix,
};
use ms1query::{
    PeakIndex,
    Tolerance,
    TupleRange,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

// Neighbourhood of the current cell explored while growing.
const ROW_REACH: u32 = 2;
const COL_REACH: u32 = 1;

/// Greedy best-first region growing over a built [FeatureMatrix].
///
/// Seeds are visited from the most to the least correlated cell. Every
/// cell can be claimed by one cluster only, and once a cluster closes
/// its whole bounding box is claimed. A neighbour joins only if it strictly
/// improves the summed envelope, so cells that merely repeat it are left to
/// seed clusters of their own.
#[derive(Debug, Clone, Copy)]
pub struct ClusterFinder<'a> {
    params: &'a ClusteringParams,
    tolerance: Tolerance,
    index: &'a PeakIndex,
}

struct Growth {
    summed: Vec<f64>,
    correlation: f64,
    distance: f64,
    rows: TupleRange<u32>,
    cols: TupleRange<u32>,
    members: Vec<FeatureCell>,
    claimed: Vec<FeatureCell>,
}

fn extend(range: TupleRange<u32>, x: u32) -> TupleRange<u32> {
    range.union(TupleRange::single(x))
}

impl<'a> ClusterFinder<'a> {
    pub fn new(params: &'a ClusteringParams, tolerance: Tolerance, index: &'a PeakIndex) -> Self {
        Self {
            params,
            tolerance,
            index,
        }
    }

    fn seeds(&self, matrix: &FeatureMatrix, rows: (u32, u32)) -> Vec<(f64, FeatureCell)> {
        let mut seeds = Vec::new();
        for row in rows.0..=rows.1 {
            if !matrix.is_row_observed(row) {
                continue;
            }
            for col in 0..matrix.num_cols() as u32 {
                let cell = FeatureCell::new(row, col);
                let corr = matrix.correlation(cell);
                if corr >= self.params.seed_correlation {
                    seeds.push((corr, cell));
                }
            }
        }
        seeds.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        seeds
    }

    /// Clusters the matrix, resetting any claim left from a previous call.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn find_clusters(
        &self,
        matrix: &mut FeatureMatrix,
        isotopes: &Arc<IsotopeList>,
    ) -> Vec<FeatureCluster> {
        matrix.reset_claims();
        let Some(rows) = matrix.observed_row_span() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (seed_corr, seed) in self.seeds(matrix, rows) {
            if matrix.is_claimed(seed) {
                continue;
            }
            let Some(rep_peak) = matrix
                .most_abundant_peak(seed)
                .and_then(|pos| self.index.get(pos))
            else {
                // Without the most abundant isotope there is no mass to anchor on.
                continue;
            };
            let representative = Representative {
                mass: matrix.accurate_mass(seed),
                charge: matrix.charge(seed.row),
                mz: rep_peak.mz,
                scan_number: self.index.scan_number(seed.col).unwrap_or(0),
            };

            let growth = self.grow(matrix, isotopes, seed, seed_corr, representative.mass, rows);
            if growth.correlation < self.params.cluster_correlation_cutoff {
                trace!(
                    "Dropping cluster at charge {} scan {} (corr {:.3})",
                    representative.charge,
                    representative.scan_number,
                    growth.correlation
                );
                continue;
            }

            let charges = TupleRange::single(matrix.charge(growth.rows.start()))
                .union(TupleRange::single(matrix.charge(growth.rows.end())));
            let mut cluster = FeatureCluster::new(
                isotopes.clone(),
                self.index.scan_numbers().clone(),
                charges,
                growth.cols,
                representative,
            );
            cluster.member_cells = growth.members;
            cluster.claimed_cells = growth.claimed;
            cluster.growth_correlation = growth.correlation;
            cluster.summed_envelope = growth.summed;
            out.push(cluster);
        }
        out
    }

    fn grow(
        &self,
        matrix: &mut FeatureMatrix,
        isotopes: &IsotopeList,
        seed: FeatureCell,
        seed_corr: f64,
        seed_mass: f64,
        rows: (u32, u32),
    ) -> Growth {
        let summed = matrix.intensities(seed).to_vec();
        let distance = isotopes.bhattacharyya_distance(&summed);
        let mut growth = Growth {
            summed,
            correlation: seed_corr,
            distance,
            rows: TupleRange::single(seed.row),
            cols: TupleRange::single(seed.col),
            members: vec![seed],
            claimed: vec![seed],
        };
        matrix.claim(seed);

        let mass_tolerance = self.tolerance.tolerance_as_da(seed_mass);
        let last_col = (matrix.num_cols() as u32).saturating_sub(1);
        let mut candidate = vec![0.0; isotopes.len()];
        let mut queue = VecDeque::from([seed]);
        while let Some(current) = queue.pop_front() {
            let row_lo = current.row.saturating_sub(ROW_REACH).max(rows.0);
            let row_hi = (current.row + ROW_REACH).min(rows.1);
            let col_lo = current.col.saturating_sub(COL_REACH);
            let col_hi = (current.col + COL_REACH).min(last_col);
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    let cell = FeatureCell::new(row, col);
                    if matrix.is_claimed(cell) {
                        continue;
                    }
                    let corr = matrix.correlation(cell);
                    let col_distance = col.abs_diff(seed.col);
                    if corr < self.params.seed_correlation && col_distance > 1 {
                        continue;
                    }
                    if corr < self.params.loose_correlation && col_distance < 2 {
                        continue;
                    }
                    if (seed_mass - matrix.accurate_mass(cell)).abs() > mass_tolerance {
                        continue;
                    }

                    for ((c, s), x) in candidate
                        .iter_mut()
                        .zip(growth.summed.iter())
                        .zip(matrix.intensities(cell).iter())
                    {
                        *c = s + x;
                    }
                    let new_corr = isotopes.pearson_correlation(&candidate);
                    let new_distance = isotopes.bhattacharyya_distance(&candidate);
                    let accept = new_corr > growth.correlation
                        || new_distance < growth.distance
                        || (col_distance <= 1 && new_corr > seed_corr);
                    if !accept {
                        continue;
                    }

                    growth.summed.copy_from_slice(&candidate);
                    growth.correlation = new_corr;
                    growth.distance = new_distance;
                    growth.rows = extend(growth.rows, row);
                    growth.cols = extend(growth.cols, col);
                    matrix.claim(cell);
                    growth.members.push(cell);
                    growth.claimed.push(cell);
                    queue.push_back(cell);
                }
            }
        }

        for row in growth.rows.start()..=growth.rows.end() {
            for col in growth.cols.start()..=growth.cols.end() {
                let cell = FeatureCell::new(row, col);
                if matrix.claim(cell) {
                    growth.claimed.push(cell);
                }
            }
        }
        growth
    }
}
