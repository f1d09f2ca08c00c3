use std::ops::{
    Index,
    IndexMut,
};

/// The scores computed for every feature. The discriminant is the position
/// in [FeatureScores] and, shifted by one, in [LOGISTIC_COEFFICIENTS].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreKind {
    EnvelopeCorrelation = 0,
    EnvelopeCorrelationSummed = 1,
    RankSum = 2,
    Poisson = 3,
    BhattacharyyaDistance = 4,
    BhattacharyyaDistanceSummed = 5,
    BhattacharyyaDistanceSummedOverCharges = 6,
    BhattacharyyaDistanceSummedOverTimes = 7,
    XicCorrMean = 8,
    XicCorrMin = 9,
    MzError = 10,
    TotalMzError = 11,
    BhattacharyyaDistanceSummedOverEvenCharges = 12,
    BhattacharyyaDistanceSummedOverOddCharges = 13,
    AbundanceChangesOverCharges = 14,
    KullbackLeiblerDivergence = 15,
    KullbackLeiblerDivergenceSummed = 16,
}

pub const NUM_SCORE_KINDS: usize = 17;

impl ScoreKind {
    pub const ALL: [ScoreKind; NUM_SCORE_KINDS] = [
        ScoreKind::EnvelopeCorrelation,
        ScoreKind::EnvelopeCorrelationSummed,
        ScoreKind::RankSum,
        ScoreKind::Poisson,
        ScoreKind::BhattacharyyaDistance,
        ScoreKind::BhattacharyyaDistanceSummed,
        ScoreKind::BhattacharyyaDistanceSummedOverCharges,
        ScoreKind::BhattacharyyaDistanceSummedOverTimes,
        ScoreKind::XicCorrMean,
        ScoreKind::XicCorrMin,
        ScoreKind::MzError,
        ScoreKind::TotalMzError,
        ScoreKind::BhattacharyyaDistanceSummedOverEvenCharges,
        ScoreKind::BhattacharyyaDistanceSummedOverOddCharges,
        ScoreKind::AbundanceChangesOverCharges,
        ScoreKind::KullbackLeiblerDivergence,
        ScoreKind::KullbackLeiblerDivergenceSummed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScoreKind::EnvelopeCorrelation => "EnvelopeCorrelation",
            ScoreKind::EnvelopeCorrelationSummed => "EnvelopeCorrelationSummed",
            ScoreKind::RankSum => "RankSum",
            ScoreKind::Poisson => "Poisson",
            ScoreKind::BhattacharyyaDistance => "BhattacharyyaDistance",
            ScoreKind::BhattacharyyaDistanceSummed => "BhattacharyyaDistanceSummed",
            ScoreKind::BhattacharyyaDistanceSummedOverCharges => {
                "BhattacharyyaDistanceSummedOverCharges"
            }
            ScoreKind::BhattacharyyaDistanceSummedOverTimes => {
                "BhattacharyyaDistanceSummedOverTimes"
            }
            ScoreKind::XicCorrMean => "XicCorrMean",
            ScoreKind::XicCorrMin => "XicCorrMin",
            ScoreKind::MzError => "MzError",
            ScoreKind::TotalMzError => "TotalMzError",
            ScoreKind::BhattacharyyaDistanceSummedOverEvenCharges => {
                "BhattacharyyaDistanceSummedOverEvenCharges"
            }
            ScoreKind::BhattacharyyaDistanceSummedOverOddCharges => {
                "BhattacharyyaDistanceSummedOverOddCharges"
            }
            ScoreKind::AbundanceChangesOverCharges => "AbundanceChangesOverCharges",
            ScoreKind::KullbackLeiblerDivergence => "KullbackLeiblerDivergence",
            ScoreKind::KullbackLeiblerDivergenceSummed => "KullbackLeiblerDivergenceSummed",
        }
    }
}

/// Pre-trained logistic regression: intercept, then one weight per score
/// kind up to [ScoreKind::AbundanceChangesOverCharges]. The KL divergences
/// are reported but not weighted.
pub const LOGISTIC_COEFFICIENTS: [f64; 16] = [
    -13.2533634280100,
    -1.15180441819635,
    12.7696665111291,
    0.0252168712214531,
    0.0345913636891164,
    -6.70169446935268,
    0.594148009986426,
    -2.54090490836123,
    -15.7574867934127,
    -3.96462362695165,
    -6.84017486290071,
    0.697533501805824,
    0.282385690399132,
    -3.98134292531727,
    -12.6184672341575,
    1.04475408931452,
];

/// Fixed-size score vector indexed by [ScoreKind].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureScores([f64; NUM_SCORE_KINDS]);

impl FeatureScores {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// `sigmoid(b0 + sum(b_i * score_{i-1}))`.
    ///
    /// ```
    /// use ms1ft::scoring::FeatureScores;
    ///
    /// let p = FeatureScores::default().logistic_probability();
    /// assert!(p > 0.0 && p < 1e-5);
    /// ```
    pub fn logistic_probability(&self) -> f64 {
        let eta = LOGISTIC_COEFFICIENTS[1..]
            .iter()
            .zip(self.0.iter())
            .fold(LOGISTIC_COEFFICIENTS[0], |acc, (b, x)| acc + b * x);
        1.0 / (1.0 + (-eta).exp())
    }
}

impl Index<ScoreKind> for FeatureScores {
    type Output = f64;

    fn index(&self, kind: ScoreKind) -> &f64 {
        &self.0[kind as usize]
    }
}

impl IndexMut<ScoreKind> for FeatureScores {
    fn index_mut(&mut self, kind: ScoreKind) -> &mut f64 {
        &mut self.0[kind as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order() {
        for (i, kind) in ScoreKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
        assert_eq!(ScoreKind::ALL[14].name(), "AbundanceChangesOverCharges");
    }

    #[test]
    fn test_kl_is_not_weighted() {
        let mut scores = FeatureScores::default();
        let base = scores.logistic_probability();
        scores[ScoreKind::KullbackLeiblerDivergence] = 5.0;
        scores[ScoreKind::KullbackLeiblerDivergenceSummed] = 5.0;
        assert_eq!(scores.logistic_probability(), base);
        scores[ScoreKind::EnvelopeCorrelationSummed] = 1.0;
        assert!(scores.logistic_probability() > base);
    }
}
