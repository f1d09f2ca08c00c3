//! The charge x scan grid of observed isotope intensities for one candidate mass.

use crate::isotopes::IsotopeList;
use crate::utils::ion::{
    isotope_mz,
    monoisotopic_mass,
};
use ms1query::{
    MassBinning,
    PeakIndex,
    Tolerance,
    TupleRange,
};
use rayon::prelude::*;

/// The most intense isotopes of the envelope simply keep the most intense
/// matching peak of each scan; weaker isotopes pick the peak closest to the
/// intensity predicted from the strongest isotope matched so far.
const NUM_MAX_INTENSITY_ISOTOPES: usize = 4;

// Charge range heuristics, empirically tuned.
const LOW_MASS_LIMIT: f64 = 5000.0;
const LOW_MASS_MAX_CHARGE: u32 = 10;

/// Grid coordinate: charge row (offset from the minimum charge of the
/// matrix) and scan column (position in the run's MS1 scan vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureCell {
    pub row: u32,
    pub col: u32,
}

impl FeatureCell {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeRange {
    min: u32,
    max: u32,
}

impl ChargeRange {
    pub fn new(min: u32, max: u32) -> Option<Self> {
        if min == 0 || min > max {
            return None;
        }
        Some(Self { min, max })
    }

    /// Charges worth looking at for a mass: heavier molecules carry more charges.
    ///
    /// ```
    /// use ms1ft::matrix::ChargeRange;
    ///
    /// let range = ChargeRange::for_mass(10_000.0, 2, 60, 40).unwrap();
    /// assert_eq!((range.min(), range.max()), (4, 26));
    /// let light = ChargeRange::for_mass(3_000.0, 2, 60, 40).unwrap();
    /// assert_eq!((light.min(), light.max()), (2, 10));
    /// ```
    pub fn for_mass(
        mass: f64,
        min_charge: u32,
        max_charge: u32,
        max_charge_length: usize,
    ) -> Option<Self> {
        let (lb, mut ub) = if mass < LOW_MASS_LIMIT {
            (min_charge, LOW_MASS_MAX_CHARGE.min(max_charge))
        } else {
            let scaled = mass / 10_000.0;
            let lb = (13.0 / 2.5 * scaled - 0.6).floor().max(0.0) as u32;
            let ub = (18.0 * scaled + 8.0).ceil().max(0.0) as u32;
            (lb.max(min_charge), ub.min(max_charge))
        };
        if max_charge_length == 0 || lb > ub {
            return None;
        }
        if (ub - lb + 1) as usize > max_charge_length {
            ub = lb + max_charge_length as u32 - 1;
        }
        Self::new(lb, ub)
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    pub fn charge(&self, row: u32) -> u32 {
        self.min + row
    }

    pub fn row(&self, charge: u32) -> Option<u32> {
        if self.contains(charge) {
            Some(charge - self.min)
        } else {
            None
        }
    }

    pub fn contains(&self, charge: u32) -> bool {
        self.min <= charge && charge <= self.max
    }
}

/// Candidate mass plus the mass interval the isotope windows are built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassQuery {
    pub mass: f64,
    pub lower: f64,
    pub upper: f64,
}

impl MassQuery {
    /// Query covering a whole mass bin, centered on it.
    pub fn from_bin(binning: &MassBinning, bin: u32) -> Self {
        Self {
            mass: binning.bin_center(bin),
            lower: binning.bin_start(bin),
            upper: binning.bin_end(bin),
        }
    }

    /// Query for an arbitrary mass, using the bounds of the bin it falls in.
    pub fn for_mass(binning: &MassBinning, mass: f64) -> Self {
        let bin = binning.bin_number(mass);
        Self {
            mass,
            lower: binning.bin_start(bin).min(mass),
            upper: binning.bin_end(bin).max(mass),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct MatrixRow {
    // num_cols x num_isotopes, column major.
    intensities: Vec<f64>,
    correlation: Vec<f64>,
    highest_slot: Vec<usize>,
    highest_intensity: Vec<f64>,
    most_abundant_peak: Vec<Option<u32>>,
    accurate_mass: Vec<f64>,
    claimed: Vec<bool>,
    observed: bool,
}

fn reset_vec<T: Clone>(v: &mut Vec<T>, len: usize, value: T) {
    v.clear();
    v.resize(len, value);
}

impl MatrixRow {
    fn reset(&mut self, num_cols: usize, num_isotopes: usize) {
        reset_vec(&mut self.intensities, num_cols * num_isotopes, 0.0);
        reset_vec(&mut self.correlation, num_cols, 0.0);
        reset_vec(&mut self.highest_slot, num_cols, 0);
        reset_vec(&mut self.highest_intensity, num_cols, 0.0);
        reset_vec(&mut self.most_abundant_peak, num_cols, None);
        reset_vec(&mut self.accurate_mass, num_cols, 0.0);
        reset_vec(&mut self.claimed, num_cols, false);
        self.observed = false;
    }

    fn populate(
        &mut self,
        charge: u32,
        query: &MassQuery,
        isotopes: &IsotopeList,
        index: &PeakIndex,
        tolerance: &Tolerance,
    ) {
        let Some(run_range) = index.mz_range() else {
            return;
        };
        let num_isotopes = isotopes.len();

        for (rank, &slot) in isotopes.sorted_index_by_intensity().iter().enumerate() {
            let isotope = isotopes.entry(slot);
            let mut lo = isotope_mz(query.lower, charge, isotope.index);
            let mut hi = isotope_mz(query.upper, charge, isotope.index);
            lo -= tolerance.tolerance_as_da(lo);
            hi += tolerance.tolerance_as_da(hi);
            let Ok(window) = TupleRange::try_new(lo, hi) else {
                continue;
            };
            if !window.intersects(run_range) {
                continue;
            }

            for (position, peak) in index.query_with_positions(window) {
                let col = peak.column as usize;
                let cell = col * num_isotopes + slot;
                if rank < NUM_MAX_INTENSITY_ISOTOPES {
                    if peak.intensity > self.intensities[cell] {
                        self.intensities[cell] = peak.intensity;
                    }
                    if self.intensities[cell] > self.highest_intensity[col] {
                        self.highest_intensity[col] = self.intensities[cell];
                        self.highest_slot[col] = slot;
                        if rank == 0 {
                            self.most_abundant_peak[col] = Some(position);
                            self.accurate_mass[col] =
                                monoisotopic_mass(peak.mz, charge, isotope.index);
                        }
                    }
                } else {
                    let current = self.intensities[cell];
                    if current > 0.0 && self.highest_intensity[col] > 0.0 {
                        let expected = self.highest_intensity[col] * isotope.ratio
                            / isotopes.entry(self.highest_slot[col]).ratio;
                        if (peak.intensity - expected).abs() < (current - expected).abs() {
                            self.intensities[cell] = peak.intensity;
                        }
                    } else if peak.intensity > current {
                        self.intensities[cell] = peak.intensity;
                    }
                }
                self.observed = true;
            }
        }

        if self.observed {
            for col in 0..self.correlation.len() {
                if self.highest_intensity[col] > 0.0 {
                    let cell = &self.intensities[col * num_isotopes..(col + 1) * num_isotopes];
                    self.correlation[col] = isotopes.pearson_correlation(cell);
                }
            }
        }
    }
}

/// Observed isotope intensities of one candidate mass over every
/// (charge, MS1 scan) pair of the run.
///
/// The buffers are reused between builds: a worker keeps one matrix
/// around and rebuilds it for every mass it processes.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    num_cols: usize,
    num_isotopes: usize,
    charge_range: Option<ChargeRange>,
    rows: Vec<MatrixRow>,
}

impl FeatureMatrix {
    pub fn new(num_cols: usize) -> Self {
        Self {
            num_cols,
            num_isotopes: 0,
            charge_range: None,
            rows: Vec::new(),
        }
    }

    /// Fill the matrix for a candidate mass. Charge rows are populated in parallel.
    ///
    /// NOTE: Any previous content (including the claimed cells) is discarded.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn build(
        &mut self,
        query: &MassQuery,
        isotopes: &IsotopeList,
        charge_range: ChargeRange,
        index: &PeakIndex,
        tolerance: &Tolerance,
    ) {
        let num_rows = charge_range.len();
        self.num_cols = index.num_columns();
        self.num_isotopes = isotopes.len();
        self.charge_range = Some(charge_range);
        if self.rows.len() < num_rows {
            self.rows.resize_with(num_rows, MatrixRow::default);
        }

        let (num_cols, num_isotopes) = (self.num_cols, self.num_isotopes);
        self.rows[..num_rows]
            .par_iter_mut()
            .enumerate()
            .for_each(|(row, buffer)| {
                buffer.reset(num_cols, num_isotopes);
                buffer.populate(
                    charge_range.charge(row as u32),
                    query,
                    isotopes,
                    index,
                    tolerance,
                );
            });
    }

    pub fn num_rows(&self) -> usize {
        self.charge_range.map(|r| r.len()).unwrap_or(0)
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn num_isotopes(&self) -> usize {
        self.num_isotopes
    }

    pub fn charge_range(&self) -> Option<ChargeRange> {
        self.charge_range
    }

    pub fn charge(&self, row: u32) -> u32 {
        self.charge_range.map(|r| r.charge(row)).unwrap_or(0)
    }

    fn row(&self, row: u32) -> &MatrixRow {
        &self.rows[row as usize]
    }

    pub fn intensities(&self, cell: FeatureCell) -> &[f64] {
        let start = cell.col as usize * self.num_isotopes;
        &self.row(cell.row).intensities[start..start + self.num_isotopes]
    }

    pub fn correlation(&self, cell: FeatureCell) -> f64 {
        self.row(cell.row).correlation[cell.col as usize]
    }

    /// Monoisotopic mass implied by the most intense peak of the most
    /// abundant isotope, 0.0 if there is none.
    pub fn accurate_mass(&self, cell: FeatureCell) -> f64 {
        self.row(cell.row).accurate_mass[cell.col as usize]
    }

    /// [PeakIndex] position of the peak the accurate mass comes from.
    pub fn most_abundant_peak(&self, cell: FeatureCell) -> Option<u32> {
        self.row(cell.row).most_abundant_peak[cell.col as usize]
    }

    pub fn is_row_observed(&self, row: u32) -> bool {
        (row as usize) < self.num_rows() && self.row(row).observed
    }

    /// First and last charge rows with any matching peak.
    pub fn observed_row_span(&self) -> Option<(u32, u32)> {
        let mut observed = (0..self.num_rows() as u32).filter(|&r| self.row(r).observed);
        let first = observed.next()?;
        let last = observed.last().unwrap_or(first);
        Some((first, last))
    }

    pub fn is_claimed(&self, cell: FeatureCell) -> bool {
        self.row(cell.row).claimed[cell.col as usize]
    }

    /// Marks the cell as claimed, returns false if it already was.
    pub fn claim(&mut self, cell: FeatureCell) -> bool {
        let slot = &mut self.rows[cell.row as usize].claimed[cell.col as usize];
        if *slot {
            return false;
        }
        *slot = true;
        true
    }

    pub fn reset_claims(&mut self) {
        let num_rows = self.num_rows();
        for row in self.rows[..num_rows].iter_mut() {
            row.claimed.iter_mut().for_each(|x| *x = false);
        }
    }

    /// FNV-1a checksum over every cell value (claims excluded).
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf29ce484222325;
        const PRIME: u64 = 0x100000001b3;
        let mut hash = OFFSET;
        let mut feed = |x: u64| {
            for byte in x.to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        };
        if let Some(range) = self.charge_range {
            feed(range.min() as u64);
            feed(range.max() as u64);
        }
        for row in self.rows[..self.num_rows()].iter() {
            feed(row.observed as u64);
            row.intensities.iter().for_each(|x| feed(x.to_bits()));
            row.correlation.iter().for_each(|x| feed(x.to_bits()));
            row.accurate_mass.iter().for_each(|x| feed(x.to_bits()));
            row.most_abundant_peak
                .iter()
                .for_each(|x| feed(x.map(|p| p as u64).unwrap_or(u64::MAX)));
        }
        hash
    }
}
