use super::score_kind::ScoreKind;
use super::significance::{
    CandidateEnvelope,
    SignificanceTester,
};
use crate::clustering::{
    EnvelopePeak,
    FeatureCluster,
    ObservedEnvelope,
};
use crate::isotopes::IsotopeList;
use crate::matrix::{
    FeatureCell,
    FeatureMatrix,
};
use crate::utils::correlation::{
    mean_and_sample_std,
    pearson_correlation,
};
use crate::utils::divergence::DEGENERATE_DIVERGENCE;
use crate::utils::ion::{
    isotope_mz,
    monoisotopic_mass,
};
use ms1query::{
    PeakClaims,
    PeakIndex,
    SpectrumSource,
    Tolerance,
    TupleRange,
};
use tracing::debug;

/// `-log2(0.02)`, both significance scores must exceed it.
pub const LOG_P2: f64 = 5.643856189774724;

const MIN_OBSERVED_ISOTOPES: usize = 3;
const MIN_MEMBER_CORRELATION: f64 = 0.3;
// Envelopes this good hand their peaks over to the feature when it is accepted.
const MAJOR_CORRELATION: f64 = 0.6;
const MAJOR_DISTANCE: f64 = 0.2;
// Envelopes both this far and this poorly correlated do not count for the m/z error.
const MZ_ERROR_MAX_DISTANCE: f64 = 0.3;
const MZ_ERROR_MIN_CORRELATION: f64 = 0.5;
const MZ_ERROR_INIT: f64 = 10.0;
const MIN_XIC_WINDOW: u32 = 10;
const NUM_XIC_ISOTOPES: usize = 3;

/// (correlation >, distance <) a member must pass to be a good envelope.
fn envelope_thresholds(mass: f64) -> (f64, f64) {
    if mass < 15_000.0 {
        (0.6, 0.25)
    } else if mass < 25_000.0 {
        (0.4, 0.3)
    } else {
        (0.3, 0.3)
    }
}

/// Computes the score vector, probability and GoodEnough flag of clusters
/// found on a feature matrix.
pub struct FeatureScorer<'a, S: SpectrumSource + ?Sized> {
    source: &'a S,
    index: &'a PeakIndex,
    claims: &'a PeakClaims,
    tester: &'a dyn SignificanceTester,
    tolerance: Tolerance,
}

impl<'a, S: SpectrumSource + ?Sized> FeatureScorer<'a, S> {
    pub fn new(
        source: &'a S,
        index: &'a PeakIndex,
        claims: &'a PeakClaims,
        tester: &'a dyn SignificanceTester,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            source,
            index,
            claims,
            tester,
            tolerance,
        }
    }

    fn collect_envelope(
        &self,
        matrix: &FeatureMatrix,
        isotopes: &IsotopeList,
        cell: FeatureCell,
        charge: u32,
    ) -> Option<ObservedEnvelope> {
        let accurate_mass = matrix.accurate_mass(cell);
        let most_abundant = matrix
            .most_abundant_peak(cell)
            .and_then(|pos| self.index.get(pos))?;
        let scan_number = self.index.scan_number(cell.col)?;
        let Some(spectrum) = self.source.spectrum(scan_number) else {
            debug!("MS1 scan {} is not available, skipping its envelope", scan_number);
            return None;
        };

        let candidate = CandidateEnvelope {
            peaks: &spectrum.peaks,
            charge,
            accurate_mass,
            most_abundant_mz: most_abundant.mz,
        };
        let significance = self.tester.test_significance(isotopes, &candidate);
        if significance.num_observed_isotopes < MIN_OBSERVED_ISOTOPES {
            return None;
        }

        let peaks: Vec<Option<EnvelopePeak>> = significance
            .peaks
            .iter()
            .map(|matched| {
                let matched = matched.as_ref()?;
                let position = self.index.position(cell.col, matched.index_in_scan)?;
                Some(EnvelopePeak {
                    position,
                    mz: matched.mz,
                    intensity: matched.intensity,
                    active: self.claims.is_active(position),
                })
            })
            .collect();
        let mut envelope = ObservedEnvelope {
            cell,
            charge,
            scan_number,
            peaks,
            correlation: 0.0,
            bhattacharyya_distance: DEGENERATE_DIVERGENCE,
            kullback_leibler_divergence: DEGENERATE_DIVERGENCE,
            poisson_score: significance.poisson_score,
            rank_sum_score: significance.rank_sum_score,
            good: false,
            major: false,
        };
        let intensities = envelope.active_intensities();
        envelope.correlation = isotopes.pearson_correlation(&intensities);
        if envelope.correlation < MIN_MEMBER_CORRELATION {
            return None;
        }
        envelope.bhattacharyya_distance = isotopes.bhattacharyya_distance(&intensities);
        envelope.kullback_leibler_divergence =
            isotopes.kullback_leibler_divergence(&intensities, true);
        Some(envelope)
    }

    /// Envelopes of every bounding-box cell whose accurate mass matches the
    /// representative mass.
    fn collect_members(
        &self,
        cluster: &FeatureCluster,
        matrix: &FeatureMatrix,
    ) -> Vec<ObservedEnvelope> {
        let Some(charge_range) = matrix.charge_range() else {
            return Vec::new();
        };
        let rep_mass = cluster.mono_mass();
        let mass_tolerance = self.tolerance.tolerance_as_da(rep_mass);
        let mut out = Vec::new();
        for charge in cluster.min_charge()..=cluster.max_charge() {
            let Some(row) = charge_range.row(charge) else {
                continue;
            };
            for col in cluster.cols.start()..=cluster.cols.end() {
                let cell = FeatureCell::new(row, col);
                let mass = matrix.accurate_mass(cell);
                if !(mass > 0.0) || (mass - rep_mass).abs() > mass_tolerance {
                    continue;
                }
                if let Some(envelope) = self.collect_envelope(matrix, cluster.isotopes(), cell, charge) {
                    out.push(envelope);
                }
            }
        }
        out
    }

    /// Scores the cluster in place.
    ///
    /// A cluster without any qualifying member is deactivated. A cluster
    /// whose members all fail the significance and quality gates keeps a
    /// probability of 0 and is not GoodEnough.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn score(&self, cluster: &mut FeatureCluster, matrix: &FeatureMatrix) {
        let mut envelopes = self.collect_members(cluster, matrix);
        if envelopes.is_empty() {
            cluster.envelopes.clear();
            cluster.active = false;
            return;
        }
        let isotopes = cluster.isotopes.clone();
        let num_isotopes = isotopes.len();
        let (corr_threshold, distance_threshold) = envelope_thresholds(cluster.mono_mass());

        let (col_lo, col_hi) = cluster.cols.as_tuple();
        let (charge_lo, charge_hi) = cluster.charges.as_tuple();
        let mut per_time = vec![vec![0.0; num_isotopes]; (col_hi - col_lo + 1) as usize];
        let mut per_charge = vec![vec![0.0; num_isotopes]; (charge_hi - charge_lo + 1) as usize];

        let mut best_correlation = 0.0f64;
        let mut best_distance = 1.0f64;
        let mut best_rank_sum = 1.0f64;
        let mut best_poisson = 1.0f64;
        let mut rep_envelope = None;
        let mut good_count = 0;
        for (i, envelope) in envelopes.iter_mut().enumerate() {
            envelope.sum_active_into(&mut per_time[(envelope.cell.col - col_lo) as usize]);
            envelope.sum_active_into(&mut per_charge[(envelope.charge - charge_lo) as usize]);

            if envelope.correlation > corr_threshold
                && envelope.bhattacharyya_distance < distance_threshold
                && envelope.poisson_score > LOG_P2
                && envelope.rank_sum_score > LOG_P2
            {
                envelope.good = true;
                envelope.major = envelope.correlation > MAJOR_CORRELATION
                    && envelope.bhattacharyya_distance < MAJOR_DISTANCE;
                good_count += 1;
                best_poisson = best_poisson.max(envelope.poisson_score);
                best_rank_sum = best_rank_sum.max(envelope.rank_sum_score);
                best_correlation = best_correlation.max(envelope.correlation);
                if envelope.bhattacharyya_distance < best_distance {
                    best_distance = envelope.bhattacharyya_distance;
                    rep_envelope = Some(i);
                }
            }
        }

        cluster.good_envelope_count = good_count;
        let Some(rep_envelope) = rep_envelope else {
            cluster.envelopes = envelopes;
            cluster.probability = 0.0;
            cluster.good_enough = false;
            return;
        };

        let rep = &envelopes[rep_envelope];
        if let Some(slot) = rep.reference_slot(&isotopes) {
            if let Some(peak) = rep.peaks[slot] {
                cluster.representative.charge = rep.charge;
                cluster.representative.mass =
                    monoisotopic_mass(peak.mz, rep.charge, isotopes.entry(slot).index);
                cluster.representative.mz = peak.mz;
                cluster.representative.scan_number = rep.scan_number;
            }
        }
        let rep_kl = rep.kullback_leibler_divergence;

        let best_per_time = per_time
            .iter()
            .map(|env| isotopes.bhattacharyya_distance(env))
            .fold(DEGENERATE_DIVERGENCE, f64::min);

        let mut best_per_charge = DEGENERATE_DIVERGENCE;
        let mut best_even = DEGENERATE_DIVERGENCE;
        let mut best_odd = DEGENERATE_DIVERGENCE;
        let mut abundance_per_charge = Vec::with_capacity(per_charge.len());
        for (offset, env) in per_charge.iter().enumerate() {
            let distance = isotopes.bhattacharyya_distance(env);
            best_per_charge = best_per_charge.min(distance);
            if (charge_lo + offset as u32) % 2 == 0 {
                best_even = best_even.min(distance);
            } else {
                best_odd = best_odd.min(distance);
            }
            abundance_per_charge.push(env.iter().sum::<f64>());
        }

        let scores = &mut cluster.scores;
        if per_charge.len() > 1 {
            scores[ScoreKind::AbundanceChangesOverCharges] =
                match mean_and_sample_std(&abundance_per_charge) {
                    Some((mean, std)) if mean > 0.0 => std / mean,
                    _ => 0.0,
                };
            scores[ScoreKind::BhattacharyyaDistanceSummedOverEvenCharges] = best_even;
            scores[ScoreKind::BhattacharyyaDistanceSummedOverOddCharges] = best_odd;
        } else {
            scores[ScoreKind::AbundanceChangesOverCharges] = 0.0;
            scores[ScoreKind::BhattacharyyaDistanceSummedOverEvenCharges] = best_per_charge;
            scores[ScoreKind::BhattacharyyaDistanceSummedOverOddCharges] = best_per_charge;
        }

        let (mz_error, total_mz_error) =
            mz_errors(&envelopes, &isotopes, cluster.representative.mass);
        let (xic_mean, xic_min) = xic_distances(matrix, &isotopes, cluster.charges, cluster.cols);

        scores[ScoreKind::EnvelopeCorrelation] = best_correlation;
        scores[ScoreKind::RankSum] = best_rank_sum;
        scores[ScoreKind::Poisson] = best_poisson;
        scores[ScoreKind::BhattacharyyaDistance] = best_distance;
        scores[ScoreKind::BhattacharyyaDistanceSummedOverCharges] = best_per_charge;
        scores[ScoreKind::BhattacharyyaDistanceSummedOverTimes] = best_per_time;
        scores[ScoreKind::XicCorrMean] = xic_mean;
        scores[ScoreKind::XicCorrMin] = xic_min;
        scores[ScoreKind::MzError] = mz_error;
        scores[ScoreKind::TotalMzError] = total_mz_error;
        scores[ScoreKind::KullbackLeiblerDivergence] = rep_kl;

        let summed = summed_envelopes(&envelopes, &isotopes);
        scores[ScoreKind::BhattacharyyaDistanceSummed] = summed.distance.unwrap_or(best_distance);
        scores[ScoreKind::EnvelopeCorrelationSummed] = summed.correlation.unwrap_or(best_correlation);
        scores[ScoreKind::KullbackLeiblerDivergenceSummed] =
            isotopes.kullback_leibler_divergence(&summed.envelope, true);

        cluster.abundance = summed.envelope.iter().sum();
        cluster.summed_envelope = summed.envelope;
        cluster.envelopes = envelopes;
        cluster.probability = cluster.scores.logistic_probability();
        cluster.good_enough = is_good_enough(cluster);
    }
}

/// Best per-envelope mean ppm error and the mean over every matched peak.
fn mz_errors(envelopes: &[ObservedEnvelope], isotopes: &IsotopeList, mass: f64) -> (f64, f64) {
    let mut best = MZ_ERROR_INIT;
    let mut total = 0.0;
    let mut num_pairs = 0usize;
    for envelope in envelopes {
        if envelope.bhattacharyya_distance > MZ_ERROR_MAX_DISTANCE
            && envelope.correlation < MZ_ERROR_MIN_CORRELATION
        {
            continue;
        }
        let mut error = 0.0;
        let mut n = 0usize;
        for (slot, peak) in envelope.active_peaks() {
            let theoretical = isotope_mz(mass, envelope.charge, isotopes.entry(slot).index);
            error += (peak.mz - theoretical).abs() * 1e6 / theoretical;
            n += 1;
        }
        total += error;
        num_pairs += n;
        if n > 0 {
            best = best.min(error / n as f64);
        }
    }
    let total = if num_pairs > 0 {
        total / num_pairs as f64
    } else {
        0.0
    };
    (best, total)
}

/// Column window of at least [MIN_XIC_WINDOW] columns (if the run has
/// that many) covering the cluster.
fn xic_window(cols: TupleRange<u32>, num_cols: u32) -> (u32, u32) {
    let (lo, hi) = cols.as_tuple();
    let len = hi - lo + 1;
    let target = MIN_XIC_WINDOW.min(num_cols);
    if len >= target {
        return (lo, hi);
    }
    let extra = target - len;
    let lo = lo.saturating_sub(extra / 2);
    let hi = (lo + target - 1).min(num_cols - 1);
    (hi + 1 - target, hi)
}

/// `(1 - mean, 1 - max)` of the pairwise correlations between the
/// chromatograms of the most abundant isotopes.
fn xic_distances(
    matrix: &FeatureMatrix,
    isotopes: &IsotopeList,
    charges: TupleRange<u32>,
    cols: TupleRange<u32>,
) -> (f64, f64) {
    let num_xic = isotopes.len().min(NUM_XIC_ISOTOPES);
    let Some(charge_range) = matrix.charge_range() else {
        return (1.0, 1.0);
    };
    if num_xic < 2 || matrix.num_cols() == 0 {
        return (1.0, 1.0);
    }
    let (col_lo, col_hi) = xic_window(cols, matrix.num_cols() as u32);
    let slots = &isotopes.sorted_index_by_intensity()[..num_xic];
    let mut profiles = vec![vec![0.0; (col_hi - col_lo + 1) as usize]; num_xic];
    for charge in charges.start()..=charges.end() {
        let Some(row) = charge_range.row(charge) else {
            continue;
        };
        for col in col_lo..=col_hi {
            let cell = matrix.intensities(FeatureCell::new(row, col));
            for (profile, &slot) in profiles.iter_mut().zip(slots) {
                profile[(col - col_lo) as usize] += cell[slot];
            }
        }
    }

    let mut correlations = Vec::with_capacity(3);
    for i in 0..num_xic {
        for j in i + 1..num_xic {
            correlations.push(pearson_correlation(&profiles[i], &profiles[j]));
        }
    }
    let mean = correlations.iter().sum::<f64>() / correlations.len() as f64;
    let max = correlations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (1.0 - mean, 1.0 - max)
}

struct SummedEnvelopes {
    /// Result of the correlation pass.
    envelope: Vec<f64>,
    distance: Option<f64>,
    correlation: Option<f64>,
}

/// Greedy summation of member envelopes, once keeping additions that do not
/// increase the summed distance and once keeping those that do not lower the
/// summed correlation. With a single member its own envelope is used and the
/// scores are left to the caller.
fn summed_envelopes(envelopes: &[ObservedEnvelope], isotopes: &IsotopeList) -> SummedEnvelopes {
    let num_isotopes = isotopes.len();
    let mut summed = vec![0.0; num_isotopes];
    if envelopes.len() == 1 {
        envelopes[0].sum_active_into(&mut summed);
        return SummedEnvelopes {
            envelope: summed,
            distance: None,
            correlation: None,
        };
    }

    let mut temp = vec![0.0; num_isotopes];
    let mut order: Vec<usize> = (0..envelopes.len()).collect();
    order.sort_by(|&a, &b| {
        envelopes[a]
            .bhattacharyya_distance
            .total_cmp(&envelopes[b].bhattacharyya_distance)
            .then(a.cmp(&b))
    });
    let mut summed_distance = 99999.0;
    for &j in order.iter() {
        temp.copy_from_slice(&summed);
        envelopes[j].sum_active_into(&mut temp);
        let distance = isotopes.bhattacharyya_distance(&temp);
        if distance > summed_distance {
            continue;
        }
        summed_distance = distance;
        summed.copy_from_slice(&temp);
    }

    order.sort_by(|&a, &b| {
        envelopes[b]
            .correlation
            .total_cmp(&envelopes[a].correlation)
            .then(a.cmp(&b))
    });
    summed.iter_mut().for_each(|x| *x = 0.0);
    let mut summed_correlation = 0.0;
    for &j in order.iter() {
        temp.copy_from_slice(&summed);
        envelopes[j].sum_active_into(&mut temp);
        let correlation = isotopes.pearson_correlation(&temp);
        if correlation < summed_correlation {
            continue;
        }
        summed_correlation = correlation;
        summed.copy_from_slice(&temp);
    }

    SummedEnvelopes {
        envelope: summed,
        distance: Some(summed_distance),
        correlation: Some(summed_correlation),
    }
}

/// Hard accept/reject gate, independent of the logistic probability.
pub fn is_good_enough(cluster: &FeatureCluster) -> bool {
    use ScoreKind::*;
    if cluster.good_envelope_count() < 1 {
        return false;
    }
    let s = cluster.scores();
    if s[RankSum] < LOG_P2 || s[Poisson] < LOG_P2 {
        return false;
    }

    let mass = cluster.mono_mass();
    let (max_even, max_odd, max_abundance_change) = if mass < 8000.0 {
        (0.2, 0.15, 1.75)
    } else if mass < 15_000.0 {
        (0.1, 0.08, 1.5)
    } else {
        (0.1, 0.08, 1.3)
    };
    if s[BhattacharyyaDistanceSummedOverEvenCharges] > max_even
        || s[BhattacharyyaDistanceSummedOverOddCharges] > max_odd
        || s[AbundanceChangesOverCharges] > max_abundance_change
    {
        return false;
    }

    // (min correlation, min summed correlation, then maximum values of the distances)
    let limits = if mass < 15_000.0 {
        [0.6, 0.83, 0.15, 0.04, 0.08, 0.1, 0.2, 0.15, 3.0, 6.0]
    } else {
        [0.3, 0.9, 0.3, 0.02, 0.06, 0.07, 0.4, 0.25, 4.0, 6.0]
    };
    if s[EnvelopeCorrelation] < limits[0] || s[EnvelopeCorrelationSummed] < limits[1] {
        return false;
    }
    let upper_bounded = [
        BhattacharyyaDistance,
        BhattacharyyaDistanceSummed,
        BhattacharyyaDistanceSummedOverCharges,
        BhattacharyyaDistanceSummedOverTimes,
        XicCorrMean,
        XicCorrMin,
        MzError,
        TotalMzError,
    ];
    upper_bounded
        .iter()
        .zip(limits[2..].iter())
        .all(|(&kind, &max)| s[kind] <= max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::Representative;
    use crate::isotopes::Averagine;
    use crate::matrix::{
        ChargeRange,
        MassQuery,
    };
    use crate::scoring::LocalBackgroundTester;
    use ms1query::{
        InMemoryRun,
        MassBinning,
        Peak,
        Spectrum,
    };
    use std::num::NonZeroU32;
    use std::sync::Arc;

    fn small_isotopes() -> IsotopeList {
        IsotopeList::from_ratios(1000.0, &[0.5, 1.0, 0.8, 0.3], 10, 0.1).unwrap()
    }

    /// Envelope at charge 2 with the given (stored) correlation and distance.
    /// Peaks sit `ppm` above their theoretical m/z for a 1000 Da mass.
    fn envelope(intensities: &[f64], correlation: f64, distance: f64, ppm: f64) -> ObservedEnvelope {
        let isotopes = small_isotopes();
        let peaks = intensities
            .iter()
            .enumerate()
            .map(|(slot, &intensity)| {
                if intensity <= 0.0 {
                    return None;
                }
                let mz = isotope_mz(1000.0, 2, isotopes.entry(slot).index) * (1.0 + ppm * 1e-6);
                Some(EnvelopePeak {
                    position: slot as u32,
                    mz,
                    intensity,
                    active: true,
                })
            })
            .collect();
        ObservedEnvelope {
            cell: FeatureCell::new(0, 0),
            charge: 2,
            scan_number: 1,
            peaks,
            correlation,
            bhattacharyya_distance: distance,
            kullback_leibler_divergence: 0.0,
            poisson_score: 10.0,
            rank_sum_score: 10.0,
            good: true,
            major: false,
        }
    }

    const SHAPED: [f64; 4] = [50.0, 100.0, 80.0, 30.0];
    const SKEWED: [f64; 4] = [80.0, 60.0, 20.0, 10.0];

    #[test]
    fn test_summed_envelopes_follow_the_stored_scores() {
        let isotopes = small_isotopes();
        // The skewed envelope claims the better stored scores, so both passes
        // start from it and the shaped one improves the sum.
        let envelopes = vec![
            envelope(&SHAPED, 0.5, 0.3, 0.0),
            envelope(&SKEWED, 0.9, 0.1, 0.0),
        ];
        let both = [130.0, 160.0, 100.0, 40.0];
        let summed = summed_envelopes(&envelopes, &isotopes);
        assert_eq!(summed.envelope, both.to_vec());
        assert_eq!(summed.distance, Some(isotopes.bhattacharyya_distance(&both)));
        assert_eq!(summed.correlation, Some(isotopes.pearson_correlation(&both)));
        assert!(isotopes.bhattacharyya_distance(&both) < isotopes.bhattacharyya_distance(&SKEWED));
        assert!(isotopes.pearson_correlation(&both) > isotopes.pearson_correlation(&SKEWED));
    }

    #[test]
    fn test_summed_envelopes_skip_worse_additions() {
        let isotopes = small_isotopes();
        let envelopes = vec![
            envelope(&SKEWED, 0.3, 0.06, 0.0),
            envelope(&SHAPED, 1.0, 0.0, 0.0),
        ];
        let summed = summed_envelopes(&envelopes, &isotopes);
        // Adding the skewed envelope would raise the distance and lower the correlation.
        assert_eq!(summed.envelope, SHAPED.to_vec());
        assert_eq!(summed.distance, Some(isotopes.bhattacharyya_distance(&SHAPED)));
        assert!(summed.distance.unwrap() < 1e-9);
        assert!(summed.correlation.unwrap() > 0.9999);
    }

    #[test]
    fn test_single_member_sum_uses_active_peaks() {
        let isotopes = small_isotopes();
        let mut only = envelope(&SHAPED, 1.0, 0.0, 0.0);
        if let Some(peak) = only.peaks[1].as_mut() {
            peak.active = false;
        }
        let summed = summed_envelopes(&[only], &isotopes);
        assert_eq!(summed.envelope, vec![50.0, 0.0, 80.0, 30.0]);
        assert_eq!(summed.distance, None);
        assert_eq!(summed.correlation, None);
    }

    #[test]
    fn test_mz_errors() {
        let isotopes = small_isotopes();
        assert_eq!(mz_errors(&[], &isotopes, 1000.0), (MZ_ERROR_INIT, 0.0));

        // Far and poorly correlated: ignored.
        let off = envelope(&SHAPED, 0.4, 0.5, 50.0);
        assert_eq!(mz_errors(&[off.clone()], &isotopes, 1000.0), (MZ_ERROR_INIT, 0.0));

        // Either condition alone keeps the envelope.
        let far = envelope(&SHAPED, 0.6, 0.5, 2.0);
        let poor = envelope(&SHAPED, 0.4, 0.1, 4.0);
        let (best, total) = mz_errors(&[off, far, poor], &isotopes, 1000.0);
        assert!((best - 2.0).abs() < 1e-6, "{}", best);
        assert!((total - 3.0).abs() < 1e-6, "{}", total);
    }

    #[test]
    fn test_mz_errors_skip_inactive_peaks() {
        let isotopes = small_isotopes();
        let mut env = envelope(&SHAPED, 1.0, 0.0, 2.0);
        for peak in env.peaks.iter_mut().flatten() {
            peak.active = false;
        }
        // Nothing left to measure: the best error keeps its initial value.
        assert_eq!(mz_errors(&[env], &isotopes, 1000.0), (MZ_ERROR_INIT, 0.0));
    }

    fn gated_cluster(mass: f64) -> FeatureCluster {
        let isotopes = Arc::new(IsotopeList::build(mass, &Averagine::new(), 30, 0.1).unwrap());
        let mut cluster = FeatureCluster::new(
            isotopes,
            Arc::from(vec![1, 2, 3]),
            TupleRange::try_new(5, 6).unwrap(),
            TupleRange::try_new(0, 2).unwrap(),
            Representative {
                mass,
                charge: 5,
                mz: mass / 5.0,
                scan_number: 2,
            },
        );
        cluster.good_envelope_count = 1;
        cluster.scores[ScoreKind::EnvelopeCorrelation] = 1.0;
        cluster.scores[ScoreKind::EnvelopeCorrelationSummed] = 1.0;
        cluster.scores[ScoreKind::RankSum] = 10.0;
        cluster.scores[ScoreKind::Poisson] = 10.0;
        cluster
    }

    fn passes_with(mass: f64, kind: ScoreKind, value: f64) -> bool {
        let mut cluster = gated_cluster(mass);
        cluster.scores[kind] = value;
        is_good_enough(&cluster)
    }

    #[test]
    fn test_good_enough_baseline() {
        for mass in [6_000.0, 10_000.0, 20_000.0] {
            assert!(is_good_enough(&gated_cluster(mass)), "{}", mass);
        }
        let mut cluster = gated_cluster(10_000.0);
        cluster.good_envelope_count = 0;
        assert!(!is_good_enough(&cluster));
    }

    #[test]
    fn test_good_enough_thresholds() {
        use ScoreKind::*;
        const STEP: f64 = 1e-6;
        // (mass, score, limit, whether the limit is a maximum)
        let light = [
            (BhattacharyyaDistanceSummedOverEvenCharges, 0.2, true),
            (BhattacharyyaDistanceSummedOverOddCharges, 0.15, true),
            (AbundanceChangesOverCharges, 1.75, true),
        ];
        let medium = [
            (BhattacharyyaDistanceSummedOverEvenCharges, 0.1, true),
            (BhattacharyyaDistanceSummedOverOddCharges, 0.08, true),
            (AbundanceChangesOverCharges, 1.5, true),
            (EnvelopeCorrelation, 0.6, false),
            (EnvelopeCorrelationSummed, 0.83, false),
            (BhattacharyyaDistance, 0.15, true),
            (BhattacharyyaDistanceSummed, 0.04, true),
            (BhattacharyyaDistanceSummedOverCharges, 0.08, true),
            (BhattacharyyaDistanceSummedOverTimes, 0.1, true),
            (XicCorrMean, 0.2, true),
            (XicCorrMin, 0.15, true),
            (MzError, 3.0, true),
            (TotalMzError, 6.0, true),
            (RankSum, LOG_P2, false),
            (Poisson, LOG_P2, false),
        ];
        let heavy = [
            (BhattacharyyaDistanceSummedOverEvenCharges, 0.1, true),
            (BhattacharyyaDistanceSummedOverOddCharges, 0.08, true),
            (AbundanceChangesOverCharges, 1.3, true),
            (EnvelopeCorrelation, 0.3, false),
            (EnvelopeCorrelationSummed, 0.9, false),
            (BhattacharyyaDistance, 0.3, true),
            (BhattacharyyaDistanceSummed, 0.02, true),
            (BhattacharyyaDistanceSummedOverCharges, 0.06, true),
            (BhattacharyyaDistanceSummedOverTimes, 0.07, true),
            (XicCorrMean, 0.4, true),
            (XicCorrMin, 0.25, true),
            (MzError, 4.0, true),
            (TotalMzError, 6.0, true),
        ];
        let cases = light
            .iter()
            .map(|c| (6_000.0, c))
            .chain(medium.iter().map(|c| (10_000.0, c)))
            .chain(heavy.iter().map(|c| (20_000.0, c)));
        for (mass, &(kind, limit, is_max)) in cases {
            let beyond = if is_max { limit + STEP } else { limit - STEP };
            assert!(passes_with(mass, kind, limit), "{} {:?} at {}", mass, kind, limit);
            assert!(!passes_with(mass, kind, beyond), "{} {:?} at {}", mass, kind, beyond);
        }
    }

    #[test]
    fn test_member_metrics_ignore_claimed_peaks() {
        let mass = 10_000.0;
        let charge = 5;
        let isotopes = IsotopeList::build(mass, &Averagine::new(), 30, 0.1).unwrap();
        let mut peaks: Vec<Peak> = isotopes
            .entries()
            .iter()
            .map(|e| Peak::new(isotope_mz(mass, charge, e.index), e.ratio * 1e6))
            .collect();
        peaks.sort_by(|a, b| a.cmp_mz(b));
        let run = InMemoryRun::from_spectra(vec![Spectrum::new_ms1(1, peaks)]).unwrap();
        let (index, _) = PeakIndex::from_source(&run);

        let tolerance = Tolerance::Ppm(10.0);
        let range = ChargeRange::for_mass(mass, 2, 60, 40).unwrap();
        let mut matrix = FeatureMatrix::new(index.num_columns());
        let query = MassQuery::for_mass(&MassBinning::default(), mass);
        matrix.build(&query, &isotopes, range, &index, &tolerance);
        let cell = FeatureCell::new(range.row(charge).unwrap(), 0);

        // Peaks of the scan are in slot order, so slot == position in the scan.
        let slot = isotopes.sorted_index_by_intensity()[1];
        let claims = PeakClaims::new(index.len());
        let position = index.position(0, slot as u32).unwrap();
        assert!(claims.claim(position, NonZeroU32::new(1).unwrap()));

        let tester = LocalBackgroundTester::new(tolerance);
        let scorer = FeatureScorer::new(&run, &index, &claims, &tester, tolerance);
        let envelope = scorer
            .collect_envelope(&matrix, &isotopes, cell, charge)
            .unwrap();
        let active = envelope.active_intensities();
        assert_eq!(active[slot], 0.0);
        assert!(envelope.peaks[slot].is_some());
        assert_eq!(envelope.correlation, isotopes.pearson_correlation(&active));
        assert_eq!(
            envelope.bhattacharyya_distance,
            isotopes.bhattacharyya_distance(&active)
        );
        assert!(envelope.correlation < 0.9999, "{}", envelope.correlation);
    }

    #[test]
    fn test_log_p2() {
        assert!((LOG_P2 + (0.02f64).log2()).abs() < 1e-12);
    }

    #[test]
    fn test_xic_window() {
        let range = |a, b| TupleRange::try_new(a, b).unwrap();
        assert_eq!(xic_window(range(5, 5), 100), (1, 10));
        assert_eq!(xic_window(range(0, 1), 100), (0, 9));
        assert_eq!(xic_window(range(98, 99), 100), (90, 99));
        assert_eq!(xic_window(range(10, 40), 100), (10, 40));
        // Short runs use every column.
        assert_eq!(xic_window(range(2, 3), 6), (0, 5));
    }

    #[test]
    fn test_envelope_thresholds() {
        assert_eq!(envelope_thresholds(10_000.0), (0.6, 0.25));
        assert_eq!(envelope_thresholds(20_000.0), (0.4, 0.3));
        assert_eq!(envelope_thresholds(30_000.0), (0.3, 0.3));
    }
}
