use super::peak::Peak;
use crate::utils::TupleRange;
use serde::{
    Deserialize,
    Serialize,
};

/// Precursor isolation window of a fragmentation scan.
///
/// Offsets are positive values, so the isolated range is
/// `[target_mz - lower_offset, target_mz + upper_offset]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationWindow {
    pub target_mz: f64,
    pub lower_offset: f64,
    pub upper_offset: f64,
}

impl IsolationWindow {
    pub fn lower_mz(&self) -> f64 {
        self.target_mz - self.lower_offset.abs()
    }

    pub fn upper_mz(&self) -> f64 {
        self.target_mz + self.upper_offset.abs()
    }

    pub fn contains(&self, mz: f64) -> bool {
        self.lower_mz() <= mz && mz <= self.upper_mz()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub scan_number: u32,
    pub ms_level: u8,
    pub peaks: Vec<Peak>,
    pub isolation_window: Option<IsolationWindow>,
}

impl Spectrum {
    pub fn new_ms1(scan_number: u32, peaks: Vec<Peak>) -> Self {
        Self {
            scan_number,
            ms_level: 1,
            peaks,
            isolation_window: None,
        }
    }

    pub fn new_ms2(scan_number: u32, isolation_window: IsolationWindow, peaks: Vec<Peak>) -> Self {
        Self {
            scan_number,
            ms_level: 2,
            peaks,
            isolation_window: Some(isolation_window),
        }
    }

    /// Index range of the peaks inside `mz_range`.
    pub fn peak_range(&self, mz_range: TupleRange<f64>) -> std::ops::Range<usize> {
        crate::utils::binary_search_range_by_key(&self.peaks, mz_range.as_tuple(), |p| p.mz)
    }

    pub fn min_mz(&self) -> Option<f64> {
        self.peaks.first().map(|p| p.mz)
    }

    pub fn max_mz(&self) -> Option<f64> {
        self.peaks.last().map(|p| p.mz)
    }
}
