//! Tests whether the isotope peaks of an envelope stand out from the local
//! background of their spectrum.

use crate::isotopes::IsotopeList;
use crate::utils::ion::isotope_mz;
use ms1query::utils::binary_search_range_by_key;
use ms1query::{
    Peak,
    Tolerance,
    TupleRange,
};
use statrs::distribution::{
    DiscreteCDF,
    Poisson,
};
use statrs::function::erf::erfc;

/// Score reported when the p-value underflows to zero.
pub const MAX_SIGNIFICANCE_SCORE: f64 = 50.0;
/// The local window spans `mz / LOCAL_WINDOW_DIVISOR` on each side.
const LOCAL_WINDOW_DIVISOR: f64 = 512.0;
/// Isotopes at least this abundant take part in the rank-sum test.
const RANK_SUM_MIN_RATIO: f64 = 0.7;

/// A spectrum peak matched to an isotope slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPeak {
    pub index_in_scan: u32,
    pub mz: f64,
    pub intensity: f64,
}

/// What the tester looks at: one spectrum and where the envelope sits in it.
#[derive(Debug, Clone, Copy)]
pub struct CandidateEnvelope<'a> {
    /// Peaks of the spectrum, sorted by m/z.
    pub peaks: &'a [Peak],
    pub charge: u32,
    pub accurate_mass: f64,
    pub most_abundant_mz: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceResult {
    /// Matched peak per isotope slot.
    pub peaks: Vec<Option<MatchedPeak>>,
    /// Intensity rank of the matched peak among the local peaks (1 = most
    /// intense), 0 for unmatched slots.
    pub ranks: Vec<u32>,
    /// Number of distinguishable m/z positions in the local window.
    pub num_local_slots: usize,
    pub num_checked_isotopes: usize,
    pub num_local_peaks: usize,
    pub num_observed_isotopes: usize,
    pub poisson_score: f64,
    pub rank_sum_score: f64,
}

impl SignificanceResult {
    fn empty(num_isotopes: usize) -> Self {
        Self {
            peaks: vec![None; num_isotopes],
            ranks: vec![0; num_isotopes],
            num_local_slots: 0,
            num_checked_isotopes: 0,
            num_local_peaks: 0,
            num_observed_isotopes: 0,
            poisson_score: 0.0,
            rank_sum_score: 0.0,
        }
    }
}

/// Statistical significance of an observed envelope against its spectrum.
pub trait SignificanceTester: Send + Sync {
    fn test_significance(
        &self,
        isotopes: &IsotopeList,
        candidate: &CandidateEnvelope<'_>,
    ) -> SignificanceResult;
}

fn score_from_p(p: f64) -> f64 {
    if p > 0.0 {
        (-p.log2()).max(0.0)
    } else {
        MAX_SIGNIFICANCE_SCORE
    }
}

/// `-log2 P(X > k1)` for `X ~ Poisson(n1 / n * k)`.
///
/// Observing `k1` of `k` isotopes when `n1` peaks are spread over `n`
/// possible positions.
pub fn poisson_score(n: usize, k: usize, n1: usize, k1: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let lambda = n1 as f64 / n as f64 * k as f64;
    if !(lambda > 0.0) {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => score_from_p(dist.sf(k1 as u64)),
        Err(_) => 0.0,
    }
}

/// Wilcoxon rank-sum (normal approximation, lower tail) of `ranks` among `n1` peaks.
///
/// Ranks of 0 are skipped.
pub fn rank_sum_score(n1: usize, ranks: impl IntoIterator<Item = u32>) -> f64 {
    let mut count = 0usize;
    let mut rank_sum = 0.0;
    for r in ranks.into_iter().filter(|&r| r > 0) {
        count += 1;
        rank_sum += r as f64;
    }
    if count == 0 || count >= n1 {
        return 0.0;
    }
    let (c, n) = (count as f64, n1 as f64);
    let mean = c * (n + 1.0) / 2.0;
    let sd = (c * (n - c) * (n + 1.0) / 12.0).sqrt();
    if !(sd > 0.0) {
        return 0.0;
    }
    let z = (rank_sum - mean) / sd;
    let p = 0.5 * erfc(-z / std::f64::consts::SQRT_2);
    score_from_p(p)
}

/// Compares an envelope against the peaks in a window of `+- mz/512`
/// around its most abundant isotope.
#[derive(Debug, Clone, Copy)]
pub struct LocalBackgroundTester {
    tolerance: Tolerance,
}

impl LocalBackgroundTester {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    fn most_intense_within(&self, peaks: &[Peak], mz: f64) -> Option<MatchedPeak> {
        let mz_range = self.tolerance.mz_range(mz);
        let range = binary_search_range_by_key(peaks, mz_range.as_tuple(), |p| p.mz);
        let start = range.start;
        peaks[range]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.intensity.total_cmp(&b.1.intensity).then(b.0.cmp(&a.0)))
            .map(|(i, p)| MatchedPeak {
                index_in_scan: (start + i) as u32,
                mz: p.mz,
                intensity: p.intensity,
            })
    }
}

impl SignificanceTester for LocalBackgroundTester {
    fn test_significance(
        &self,
        isotopes: &IsotopeList,
        candidate: &CandidateEnvelope<'_>,
    ) -> SignificanceResult {
        let mut out = SignificanceResult::empty(isotopes.len());
        if isotopes.is_empty() || candidate.charge == 0 {
            return out;
        }
        let window = TupleRange::around(
            candidate.most_abundant_mz,
            candidate.most_abundant_mz / LOCAL_WINDOW_DIVISOR,
        );
        let local = binary_search_range_by_key(candidate.peaks, window.as_tuple(), |p| p.mz);
        let num_local_peaks = local.len();

        // Intensity ranks of the local peaks, ties go to the lower m/z.
        let mut order: Vec<usize> = local.clone().collect();
        order.sort_by(|&a, &b| {
            candidate.peaks[b]
                .intensity
                .total_cmp(&candidate.peaks[a].intensity)
                .then(a.cmp(&b))
        });
        let mut local_ranks = vec![0u32; num_local_peaks];
        for (rank, &i) in order.iter().enumerate() {
            local_ranks[i - local.start] = rank as u32 + 1;
        }

        // Walk down, then up from the most abundant isotope until leaving the window.
        let mut visit = |slot: usize| -> bool {
            let mz = isotope_mz(candidate.accurate_mass, candidate.charge, isotopes.entry(slot).index);
            if !window.contains(mz) {
                return false;
            }
            out.num_checked_isotopes += 1;
            if let Some(matched) = self.most_intense_within(candidate.peaks, mz) {
                let i = matched.index_in_scan as usize;
                if local.contains(&i) {
                    out.ranks[slot] = local_ranks[i - local.start];
                }
                out.peaks[slot] = Some(matched);
                out.num_observed_isotopes += 1;
            }
            true
        };
        let most_abundant = isotopes.most_abundant_slot();
        for slot in (0..=most_abundant).rev() {
            if !visit(slot) {
                break;
            }
        }
        for slot in most_abundant + 1..isotopes.len() {
            if !visit(slot) {
                break;
            }
        }

        let tol_lo = self.tolerance.tolerance_as_da(window.start());
        let tol_hi = self.tolerance.tolerance_as_da(window.end());
        let mean_tol = 0.5 * (tol_lo + tol_hi);
        out.num_local_slots = if mean_tol > 0.0 {
            (window.width() / mean_tol).round() as usize
        } else {
            0
        };
        out.num_local_peaks = num_local_peaks;
        out.poisson_score = poisson_score(
            out.num_local_slots,
            out.num_checked_isotopes,
            num_local_peaks,
            out.num_observed_isotopes,
        );

        let high_ranks = isotopes
            .sorted_index_by_intensity()
            .iter()
            .take_while(|&&slot| isotopes.entry(slot).ratio >= RANK_SUM_MIN_RATIO)
            .map(|&slot| out.ranks[slot]);
        out.rank_sum_score = rank_sum_score(num_local_peaks, high_ranks);
        out
    }
}
