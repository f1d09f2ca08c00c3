use serde::{
    Deserialize,
    Serialize,
};

/// A centroided peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self { mz, intensity }
    }

    pub fn is_finite(&self) -> bool {
        self.mz.is_finite() && self.intensity.is_finite()
    }

    /// Orders peaks by m/z, breaking ties by intensity.
    pub fn cmp_mz(&self, other: &Self) -> std::cmp::Ordering {
        self.mz
            .total_cmp(&other.mz)
            .then(self.intensity.total_cmp(&other.intensity))
    }
}

impl From<(f64, f64)> for Peak {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_sorting() {
        let mut peaks = vec![
            Peak::new(300.0, 1.0),
            Peak::new(100.0, 5.0),
            Peak::new(100.0, 2.0),
        ];
        peaks.sort_by(Peak::cmp_mz);
        assert_eq!(peaks[0], Peak::new(100.0, 2.0));
        assert_eq!(peaks[1], Peak::new(100.0, 5.0));
        assert_eq!(peaks[2], Peak::new(300.0, 1.0));
    }
}
