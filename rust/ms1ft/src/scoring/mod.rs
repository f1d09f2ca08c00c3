pub mod score_kind;
pub mod scorer;
pub mod significance;

pub use score_kind::{
    FeatureScores,
    ScoreKind,
    LOGISTIC_COEFFICIENTS,
    NUM_SCORE_KINDS,
};
pub use scorer::{
    is_good_enough,
    FeatureScorer,
    LOG_P2,
};
pub use significance::{
    CandidateEnvelope,
    LocalBackgroundTester,
    MatchedPeak,
    SignificanceResult,
    SignificanceTester,
};
