use statrs::function::factorial::ln_factorial;
use std::collections::HashMap;
use std::sync::{
    Arc,
    RwLock,
};

/// Anything that can produce the theoretical isotope envelope of a mass.
///
/// The envelope is a list of relative heights (most abundant isotope = 1.0),
/// where position `i` is the isotope `i` Daltons (13C units) above the
/// monoisotopic peak.
pub trait IsotopeEnvelopeSource: Send + Sync {
    fn approximate_envelope(&self, mass: f64) -> Arc<[f64]>;
}

const AVERAGINE_UNIT_MASS: f64 = 111.1254;
// Averagine composition per unit: C, H, N, O, S
const AVERAGINE_C: f64 = 4.9384;
const AVERAGINE_H: f64 = 7.7583;
const AVERAGINE_N: f64 = 1.3577;
const AVERAGINE_O: f64 = 1.4773;
const AVERAGINE_S: f64 = 0.0417;

// Natural abundances of the heavy isotopes, relative to the light one.
const P_13C: f64 = 0.0107;
const P_2H: f64 = 0.000115;
const P_15N: f64 = 0.00364;
const P_17O: f64 = 0.00038;
const P_33S: f64 = 0.0075;
const P_18O: f64 = 0.00205;
const P_34S: f64 = 0.0425;

/// Isotope envelopes of the averagine model, cached per nominal mass.
///
/// Uses the Poisson approximation of the isotope distribution: the number of
/// +1 Da substitutions (13C, 2H, 15N, 17O, 33S) and of +2 Da substitutions
/// (18O, 34S) are treated as independent Poisson variables.
///
/// ```
/// use ms1ft::isotopes::{Averagine, IsotopeEnvelopeSource};
///
/// let averagine = Averagine::new();
/// let env = averagine.approximate_envelope(10_000.0);
/// let max = env.iter().cloned().fold(0.0, f64::max);
/// assert_eq!(max, 1.0);
/// // A 10 kDa protein has a mono-isotopic peak that is barely visible.
/// assert!(env[0] < 0.05);
/// ```
#[derive(Debug, Default)]
pub struct Averagine {
    cache: RwLock<HashMap<u32, Arc<[f64]>>>,
}

impl Averagine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_cached(&self) -> usize {
        match self.cache.read() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Envelope computed straight from the model, without caching.
    pub fn envelope_for_mass(mass: f64) -> Vec<f64> {
        let units = mass.max(0.0) / AVERAGINE_UNIT_MASS;
        let (c, h, n, o, s) = (
            AVERAGINE_C * units,
            AVERAGINE_H * units,
            AVERAGINE_N * units,
            AVERAGINE_O * units,
            AVERAGINE_S * units,
        );
        let lambda1 = c * P_13C + h * P_2H + n * P_15N + o * P_17O + s * P_33S;
        let lambda2 = o * P_18O + s * P_34S;

        let len = (lambda1 + 2.0 * lambda2 + 8.0 * (lambda1 + 4.0 * lambda2).sqrt() + 10.0).ceil()
            as usize;
        let plus_one = poisson_series(lambda1, len);
        let plus_two = poisson_series(lambda2, len / 2 + 1);

        let mut envelope = vec![0.0; len];
        for (i, slot) in envelope.iter_mut().enumerate() {
            *slot = plus_two
                .iter()
                .enumerate()
                .take_while(|(j, _)| 2 * j <= i)
                .map(|(j, p2)| p2 * plus_one[i - 2 * j])
                .sum();
        }

        let max = envelope.iter().cloned().fold(0.0, f64::max);
        if max > 0.0 {
            envelope.iter_mut().for_each(|x| *x /= max);
        }
        envelope
    }
}

fn poisson_series(lambda: f64, len: usize) -> Vec<f64> {
    if lambda <= 0.0 {
        let mut out = vec![0.0; len.max(1)];
        out[0] = 1.0;
        return out;
    }
    let ln_lambda = lambda.ln();
    (0..len)
        .map(|k| (k as f64 * ln_lambda - lambda - ln_factorial(k as u64)).exp())
        .collect()
}

impl IsotopeEnvelopeSource for Averagine {
    fn approximate_envelope(&self, mass: f64) -> Arc<[f64]> {
        let nominal = mass.round().max(0.0) as u32;
        let cached = match self.cache.read() {
            Ok(cache) => cache.get(&nominal).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&nominal).cloned(),
        };
        if let Some(env) = cached {
            return env;
        }

        let env: Arc<[f64]> = Self::envelope_for_mass(nominal as f64).into();
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.entry(nominal).or_insert(env).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_mass_is_mono_dominated() {
        let env = Averagine::envelope_for_mass(500.0);
        assert_eq!(env[0], 1.0);
        assert!(env[1] < 0.4);
    }

    #[test]
    fn test_ten_kda_shape() {
        let env = Averagine::envelope_for_mass(10_000.0);
        let apex = env
            .iter()
            .enumerate()
            .fold((0, 0.0), |acc, (i, &x)| if x > acc.1 { (i, x) } else { acc });
        assert!((5..=7).contains(&apex.0), "apex at {}", apex.0);
        let above_tenth = env.iter().filter(|&&x| x >= 0.1).count();
        assert!((10..=14).contains(&above_tenth), "{} isotopes", above_tenth);
        let total: f64 = env.iter().sum();
        assert!(total > 5.0);
    }

    #[test]
    fn test_cache_per_nominal_mass() {
        let averagine = Averagine::new();
        let a = averagine.approximate_envelope(10_000.2);
        let b = averagine.approximate_envelope(9_999.8);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(averagine.num_cached(), 1);
        let _ = averagine.approximate_envelope(12_000.0);
        assert_eq!(averagine.num_cached(), 2);
    }
}
