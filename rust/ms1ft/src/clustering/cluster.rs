use crate::isotopes::IsotopeList;
use crate::matrix::FeatureCell;
use crate::scoring::{
    FeatureScores,
    ScoreKind,
};
use ms1query::TupleRange;
use std::sync::Arc;

/// A peak of an observed envelope, addressed by its [ms1query::PeakIndex] position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePeak {
    pub position: u32,
    pub mz: f64,
    pub intensity: f64,
    /// False when the peak was already claimed by an accepted feature.
    pub active: bool,
}

/// The isotope peaks of one (charge, scan) cell, one slot per theoretical isotope.
#[derive(Debug, Clone)]
pub struct ObservedEnvelope {
    pub cell: FeatureCell,
    pub charge: u32,
    pub scan_number: u32,
    pub peaks: Vec<Option<EnvelopePeak>>,
    pub correlation: f64,
    pub bhattacharyya_distance: f64,
    pub kullback_leibler_divergence: f64,
    pub poisson_score: f64,
    pub rank_sum_score: f64,
    /// Passed the significance and envelope quality gates.
    pub good: bool,
    /// Strong enough for its peaks to be claimed when the feature is accepted.
    pub major: bool,
}

impl ObservedEnvelope {
    /// Intensities of the active peaks, 0.0 for missing and claimed ones.
    pub fn active_intensities(&self) -> Vec<f64> {
        self.peaks
            .iter()
            .map(|p| match p {
                Some(p) if p.active => p.intensity,
                _ => 0.0,
            })
            .collect()
    }

    /// Adds the intensities of the active peaks to `target`.
    pub fn sum_active_into(&self, target: &mut [f64]) {
        for (t, p) in target.iter_mut().zip(self.peaks.iter()) {
            if let Some(p) = p {
                if p.active {
                    *t += p.intensity;
                }
            }
        }
    }

    /// First active peak in order of theoretical abundance.
    pub fn reference_slot(&self, isotopes: &IsotopeList) -> Option<usize> {
        isotopes
            .sorted_index_by_intensity()
            .iter()
            .copied()
            .find(|&slot| matches!(self.peaks.get(slot), Some(Some(p)) if p.active))
    }

    pub fn active_peaks(&self) -> impl Iterator<Item = (usize, &EnvelopePeak)> {
        self.peaks
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.as_ref().filter(|p| p.active).map(|p| (slot, p)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Representative {
    pub mass: f64,
    pub charge: u32,
    pub mz: f64,
    pub scan_number: u32,
}

/// A candidate molecular feature: a charge x scan region of one candidate mass.
///
/// Created by [crate::clustering::ClusterFinder], filled in by
/// [crate::scoring::FeatureScorer] and possibly merged with features of
/// neighbouring masses by [crate::sweep::FeatureDeduplicator].
#[derive(Debug, Clone)]
pub struct FeatureCluster {
    pub(crate) isotopes: Arc<IsotopeList>,
    pub(crate) scan_numbers: Arc<[u32]>,
    pub(crate) charges: TupleRange<u32>,
    pub(crate) cols: TupleRange<u32>,
    pub(crate) representative: Representative,
    pub(crate) member_cells: Vec<FeatureCell>,
    pub(crate) claimed_cells: Vec<FeatureCell>,
    pub(crate) growth_correlation: f64,
    pub(crate) envelopes: Vec<ObservedEnvelope>,
    pub(crate) summed_envelope: Vec<f64>,
    pub(crate) scores: FeatureScores,
    pub(crate) abundance: f64,
    pub(crate) probability: f64,
    pub(crate) good_envelope_count: usize,
    pub(crate) good_enough: bool,
    pub(crate) active: bool,
}

impl FeatureCluster {
    pub(crate) fn new(
        isotopes: Arc<IsotopeList>,
        scan_numbers: Arc<[u32]>,
        charges: TupleRange<u32>,
        cols: TupleRange<u32>,
        representative: Representative,
    ) -> Self {
        let num_isotopes = isotopes.len();
        Self {
            isotopes,
            scan_numbers,
            charges,
            cols,
            representative,
            member_cells: Vec::new(),
            claimed_cells: Vec::new(),
            growth_correlation: 0.0,
            envelopes: Vec::new(),
            summed_envelope: vec![0.0; num_isotopes],
            scores: FeatureScores::default(),
            abundance: 0.0,
            probability: 0.0,
            good_envelope_count: 0,
            good_enough: false,
            active: true,
        }
    }

    pub fn mono_mass(&self) -> f64 {
        self.representative.mass
    }

    pub fn representative(&self) -> &Representative {
        &self.representative
    }

    pub fn isotopes(&self) -> &IsotopeList {
        &self.isotopes
    }

    pub fn charge_range(&self) -> TupleRange<u32> {
        self.charges
    }

    pub fn min_charge(&self) -> u32 {
        self.charges.start()
    }

    pub fn max_charge(&self) -> u32 {
        self.charges.end()
    }

    /// Range of MS1 scan columns (positions in the run's MS1 scan vector).
    pub fn col_range(&self) -> TupleRange<u32> {
        self.cols
    }

    fn scan_at(&self, col: u32) -> u32 {
        self.scan_numbers.get(col as usize).copied().unwrap_or(0)
    }

    pub fn min_scan(&self) -> u32 {
        self.scan_at(self.cols.start())
    }

    pub fn max_scan(&self) -> u32 {
        self.scan_at(self.cols.end())
    }

    /// Cells the cluster grew over.
    pub fn member_cells(&self) -> &[FeatureCell] {
        &self.member_cells
    }

    /// Cells claimed on the feature matrix: members plus the remainder
    /// of the bounding box that was still free at closure.
    pub fn claimed_cells(&self) -> &[FeatureCell] {
        &self.claimed_cells
    }

    /// Correlation of the summed envelope when the cluster stopped growing.
    pub fn growth_correlation(&self) -> f64 {
        self.growth_correlation
    }

    pub fn envelopes(&self) -> &[ObservedEnvelope] {
        &self.envelopes
    }

    pub fn summed_envelope(&self) -> &[f64] {
        &self.summed_envelope
    }

    /// `(isotope index, summed intensity)` pairs.
    pub fn envelope_pairs(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.isotopes
            .entries()
            .iter()
            .zip(self.summed_envelope.iter())
            .map(|(e, &x)| (e.index, x))
    }

    pub fn scores(&self) -> &FeatureScores {
        &self.scores
    }

    pub fn score(&self, kind: ScoreKind) -> f64 {
        self.scores[kind]
    }

    pub fn abundance(&self) -> f64 {
        self.abundance
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn good_envelope_count(&self) -> usize {
        self.good_envelope_count
    }

    pub fn good_enough(&self) -> bool {
        self.good_enough
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Positions of the active peaks of the major envelopes, the peaks an
    /// accepted feature takes ownership of.
    pub fn major_peak_positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.envelopes
            .iter()
            .filter(|e| e.major)
            .flat_map(|e| e.active_peaks().map(|(_, p)| p.position))
    }

    /// Whether the charge x scan bounding boxes intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.charges.intersects(other.charges) && self.cols.intersects(other.cols)
    }

    /// Grows the bounding box to cover the other cluster as well.
    pub fn absorb_bounds(&mut self, other: &Self) {
        self.charges = self.charges.union(other.charges);
        self.cols = self.cols.union(other.cols);
    }
}
