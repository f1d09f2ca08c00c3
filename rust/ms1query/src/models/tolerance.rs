use crate::utils::TupleRange;
use serde::{
    Deserialize,
    Serialize,
};

/// Mass accuracy tolerance.
///
/// The tolerance is symmetric: a value of `10 ppm` on a peak at 1000 m/z
/// means the range `[999.99, 1000.01]`. The same tolerance applies to neutral
/// masses, since both are just positions on a mass axis.
///
/// Example:
/// ```
/// use ms1query::Tolerance;
///
/// let tol = Tolerance::default(); // 10 ppm
/// let range = tol.mz_range(1000.0);
/// assert!((range.start() - 999.99).abs() < 1e-9);
/// assert!((range.end() - 1000.01).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Tolerance {
    #[serde(rename = "ppm")]
    Ppm(f64),
    #[serde(rename = "da")]
    Da(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Ppm(10.0)
    }
}

impl Tolerance {
    /// Half width of the tolerance window at `mz`, in Da (or Th, for m/z values).
    pub fn tolerance_as_da(&self, mz: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => mz * ppm.abs() * 1e-6,
            Tolerance::Da(da) => da.abs(),
        }
    }

    /// Half width of the tolerance window at `mz`, in parts per million.
    pub fn tolerance_as_ppm(&self, mz: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => ppm.abs(),
            Tolerance::Da(da) => {
                if mz > 0.0 {
                    da.abs() / mz * 1e6
                } else {
                    0.0
                }
            }
        }
    }

    pub fn mz_range(&self, mz: f64) -> TupleRange<f64> {
        TupleRange::around(mz, self.tolerance_as_da(mz))
    }

    /// Whether `observed` matches `reference` within this tolerance.
    ///
    /// The window is computed at the reference value.
    pub fn matches(&self, reference: f64, observed: f64) -> bool {
        (reference - observed).abs() <= self.tolerance_as_da(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_conversions() {
        let tol = Tolerance::Ppm(10.0);
        assert!((tol.tolerance_as_da(10_000.0) - 0.1).abs() < 1e-12);
        assert_eq!(tol.tolerance_as_ppm(123.0), 10.0);
        assert!(tol.matches(10_000.0, 10_000.09));
        assert!(!tol.matches(10_000.0, 10_000.11));
    }

    #[test]
    fn test_da_conversions() {
        let tol = Tolerance::Da(0.02);
        assert_eq!(tol.tolerance_as_da(500.0), 0.02);
        assert!((tol.tolerance_as_ppm(1000.0) - 20.0).abs() < 1e-9);
        assert_eq!(tol.tolerance_as_ppm(0.0), 0.0);
    }

    #[test]
    fn test_serde_layout() {
        let tol: Tolerance = serde_json::from_str(r#"{"type": "ppm", "value": 5.0}"#).unwrap();
        assert_eq!(tol, Tolerance::Ppm(5.0));
        let out = serde_json::to_string(&Tolerance::Da(0.5)).unwrap();
        assert_eq!(out, r#"{"type":"da","value":0.5}"#);
    }
}
