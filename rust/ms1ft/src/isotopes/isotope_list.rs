use super::averagine::IsotopeEnvelopeSource;
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::utils::divergence::{
    bhattacharyya_distance,
    jensen_shannon_divergence,
    kullback_leibler_divergence,
};

/// Below this mass at most half of the isotopes may be missing for a
/// meaningful correlation, above it 70%.
const MISSING_ISOTOPES_MASS_SPLIT: f64 = 13_000.0;
const MAX_MISSING_FRACTION_LIGHT: f64 = 0.5;
const MAX_MISSING_FRACTION_HEAVY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotopeEntry {
    /// Offset (in 13C units) from the monoisotopic peak.
    pub index: u32,
    /// Height relative to the most abundant isotope.
    pub ratio: f64,
}

/// Truncated theoretical isotope envelope of a candidate mass.
///
/// Entries ("slots") are ordered by isotope index. Only isotopes with a
/// relative height of at least the threshold and within the top
/// `max_isotopes` are kept, so the slots do not need to be contiguous in
/// principle, even though they are for unimodal envelopes.
#[derive(Debug, Clone)]
pub struct IsotopeList {
    mono_mass: f64,
    entries: Vec<IsotopeEntry>,
    envelope: Vec<f64>,
    envelope_pdf: Vec<f64>,
    sorted_index_by_intensity: Vec<usize>,
}

impl IsotopeList {
    pub fn build<S: IsotopeEnvelopeSource + ?Sized>(
        mass: f64,
        source: &S,
        max_isotopes: usize,
        relative_intensity_threshold: f64,
    ) -> Result<Self> {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(FeatureFindingError::invalid_input(format!(
                "candidate mass must be positive and finite, got {}",
                mass
            )));
        }
        let ratios = source.approximate_envelope(mass);
        Self::from_ratios(mass, &ratios, max_isotopes, relative_intensity_threshold)
    }

    /// Truncate an envelope of raw relative heights (position = isotope index).
    pub fn from_ratios(
        mass: f64,
        ratios: &[f64],
        max_isotopes: usize,
        relative_intensity_threshold: f64,
    ) -> Result<Self> {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(FeatureFindingError::invalid_input(format!(
                "candidate mass must be positive and finite, got {}",
                mass
            )));
        }
        if let Some(index) = ratios.iter().position(|x| !x.is_finite()) {
            return Err(FeatureFindingError::NonFiniteIsotopeRatio { mass, index });
        }
        let max = ratios.iter().cloned().fold(0.0, f64::max);
        if !(max > 0.0) {
            return Err(FeatureFindingError::invalid_input(format!(
                "isotope envelope of mass {} has no positive entry",
                mass
            )));
        }

        // 1-based rank of every isotope by height, ties go to the lighter isotope.
        let mut order: Vec<usize> = (0..ratios.len()).collect();
        order.sort_by(|&a, &b| ratios[b].total_cmp(&ratios[a]).then(a.cmp(&b)));
        let mut rankings = vec![0usize; ratios.len()];
        for (rank, &i) in order.iter().enumerate() {
            rankings[i] = rank + 1;
        }

        let entries: Vec<IsotopeEntry> = ratios
            .iter()
            .enumerate()
            .filter_map(|(i, &r)| {
                let ratio = r / max;
                if ratio > 0.0 && ratio >= relative_intensity_threshold && rankings[i] <= max_isotopes
                {
                    Some(IsotopeEntry {
                        index: i as u32,
                        ratio,
                    })
                } else {
                    None
                }
            })
            .collect();
        if entries.is_empty() {
            return Err(FeatureFindingError::invalid_input(format!(
                "no isotope of mass {} survives the truncation",
                mass
            )));
        }

        let envelope: Vec<f64> = entries.iter().map(|e| e.ratio).collect();
        let total: f64 = envelope.iter().sum();
        let envelope_pdf = envelope.iter().map(|x| x / total).collect();
        let mut sorted_index_by_intensity: Vec<usize> = (0..entries.len()).collect();
        sorted_index_by_intensity.sort_by(|&a, &b| {
            entries[b]
                .ratio
                .total_cmp(&entries[a].ratio)
                .then(a.cmp(&b))
        });

        Ok(Self {
            mono_mass: mass,
            entries,
            envelope,
            envelope_pdf,
            sorted_index_by_intensity,
        })
    }

    pub fn mono_mass(&self) -> f64 {
        self.mono_mass
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IsotopeEntry] {
        &self.entries
    }

    pub fn entry(&self, slot: usize) -> &IsotopeEntry {
        &self.entries[slot]
    }

    /// Relative heights, one per slot.
    pub fn envelope(&self) -> &[f64] {
        &self.envelope
    }

    pub fn envelope_pdf(&self) -> &[f64] {
        &self.envelope_pdf
    }

    /// Slots ordered from the most to the least abundant isotope.
    pub fn sorted_index_by_intensity(&self) -> &[usize] {
        &self.sorted_index_by_intensity
    }

    /// Entry of the `rank`-th most abundant isotope (0 = most abundant).
    pub fn ranked_at(&self, rank: usize) -> Option<&IsotopeEntry> {
        self.sorted_index_by_intensity
            .get(rank)
            .map(|&slot| &self.entries[slot])
    }

    pub fn most_abundant_slot(&self) -> usize {
        self.sorted_index_by_intensity[0]
    }

    pub fn most_abundant(&self) -> &IsotopeEntry {
        &self.entries[self.most_abundant_slot()]
    }

    /// Zero-floored Pearson correlation between the theoretical envelope and an
    /// observed intensity vector aligned to the slots.
    ///
    /// Returns 0.0 for degenerate inputs and when too many isotopes are
    /// missing (more than half below 13 kDa, more than 70% above).
    pub fn pearson_correlation(&self, observed: &[f64]) -> f64 {
        let count = self.envelope.len();
        let observed_at = |i: usize| observed.get(i).copied().unwrap_or(0.0);

        let mut m1 = 0.0;
        let mut m2 = 0.0;
        let mut num_missing = 0;
        for i in 0..count {
            m1 += self.envelope[i];
            let x = observed_at(i);
            if x > 0.0 {
                m2 += x;
            } else {
                num_missing += 1;
            }
        }
        let max_missing_fraction = if self.mono_mass < MISSING_ISOTOPES_MASS_SPLIT {
            MAX_MISSING_FRACTION_LIGHT
        } else {
            MAX_MISSING_FRACTION_HEAVY
        };
        if num_missing as f64 > count as f64 * max_missing_fraction {
            return 0.0;
        }
        m1 /= count as f64;
        m2 /= count as f64;

        let mut cov = 0.0;
        let mut s1 = 0.0;
        let mut s2 = 0.0;
        for i in 0..count {
            let d1 = self.envelope[i] - m1;
            let d2 = observed_at(i) - m2;
            cov += d1 * d2;
            s1 += d1 * d1;
            s2 += d2 * d2;
        }
        if s1 <= 0.0 || s2 <= 0.0 || cov < 0.0 {
            return 0.0;
        }
        (cov / (s1 * s2).sqrt()).min(1.0)
    }

    pub fn bhattacharyya_distance(&self, observed: &[f64]) -> f64 {
        bhattacharyya_distance(&self.envelope_pdf, observed)
    }

    pub fn kullback_leibler_divergence(&self, observed: &[f64], smoothing: bool) -> f64 {
        kullback_leibler_divergence(&self.envelope_pdf, observed, smoothing)
    }

    pub fn jensen_shannon_divergence(&self, observed: &[f64]) -> f64 {
        jensen_shannon_divergence(&self.envelope_pdf, observed)
    }
}
