//! Distances between a theoretical isotope distribution and an observed
//! (unnormalised) intensity vector.
//!
//! Observed vectors with missing (non-positive) entries are smoothed: every
//! missing slot gets `1e-6` and the observed entries give up `1e-6 / n_observed`
//! each, so logarithms stay finite.

/// Value returned when the observed vector carries no signal at all.
pub const DEGENERATE_DIVERGENCE: f64 = 10.0;

const SMOOTHING_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct ObservedNormalizer {
    total: f64,
    shift: f64,
    smoothing: bool,
}

impl ObservedNormalizer {
    fn new(observed: &[f64], len: usize, smoothing: bool) -> Option<Self> {
        let mut total = 0.0;
        let mut num_observed = 0usize;
        for i in 0..len {
            let x = observed.get(i).copied().unwrap_or(0.0);
            if x > 0.0 {
                total += x;
                num_observed += 1;
            }
        }
        if num_observed == 0 || !(total > 0.0) {
            return None;
        }
        let shift = if smoothing && num_observed != len {
            SMOOTHING_EPS / num_observed as f64
        } else {
            0.0
        };
        Some(Self {
            total,
            shift,
            smoothing: smoothing && num_observed != len,
        })
    }

    #[inline]
    fn probability(&self, x: f64) -> f64 {
        if x > 0.0 {
            (x / self.total - self.shift).max(f64::MIN_POSITIVE)
        } else if self.smoothing {
            SMOOTHING_EPS
        } else {
            0.0
        }
    }
}

#[inline]
fn observed_at(observed: &[f64], i: usize) -> f64 {
    observed.get(i).copied().unwrap_or(0.0)
}

/// `-ln(sum(sqrt(p * q)))`, floored at 0.
pub fn bhattacharyya_distance(theoretical_pdf: &[f64], observed: &[f64]) -> f64 {
    let len = theoretical_pdf.len();
    let Some(norm) = ObservedNormalizer::new(observed, len, true) else {
        return DEGENERATE_DIVERGENCE;
    };
    let coefficient: f64 = theoretical_pdf
        .iter()
        .enumerate()
        .map(|(i, p)| (p * norm.probability(observed_at(observed, i))).sqrt())
        .sum();
    if !(coefficient > 0.0) {
        return DEGENERATE_DIVERGENCE;
    }
    (-coefficient.ln()).max(0.0)
}

/// KL(theoretical || observed) in bits.
///
/// Without smoothing a missing observed entry makes the divergence infinite,
/// which is reported as [DEGENERATE_DIVERGENCE].
pub fn kullback_leibler_divergence(
    theoretical_pdf: &[f64],
    observed: &[f64],
    smoothing: bool,
) -> f64 {
    let len = theoretical_pdf.len();
    let Some(norm) = ObservedNormalizer::new(observed, len, smoothing) else {
        return DEGENERATE_DIVERGENCE;
    };
    let mut out = 0.0;
    for (i, &p) in theoretical_pdf.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        let q = norm.probability(observed_at(observed, i));
        if q <= 0.0 {
            return DEGENERATE_DIVERGENCE;
        }
        out += p * (p.log2() - q.log2());
    }
    out
}

/// Jensen-Shannon divergence in bits, with the same smoothing as the KL divergence.
pub fn jensen_shannon_divergence(theoretical_pdf: &[f64], observed: &[f64]) -> f64 {
    let len = theoretical_pdf.len();
    let Some(norm) = ObservedNormalizer::new(observed, len, true) else {
        return DEGENERATE_DIVERGENCE;
    };
    let mut out = 0.0;
    for (i, &p) in theoretical_pdf.iter().enumerate() {
        let q = norm.probability(observed_at(observed, i));
        let m = 0.5 * (p + q);
        if m <= 0.0 {
            continue;
        }
        if q > 0.0 {
            out += 0.5 * q * (q.log2() - m.log2());
        }
        if p > 0.0 {
            out += 0.5 * p * (p.log2() - m.log2());
        }
    }
    out.max(0.0)
}
