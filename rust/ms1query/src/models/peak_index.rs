use super::peak::Peak;
use crate::traits::SpectrumSource;
use crate::utils::{
    TupleRange,
    binary_search_range_by_key,
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::warn;

/// A peak tagged with the MS1 scan column it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedPeak {
    pub mz: f64,
    pub intensity: f64,
    /// Position of the scan in the run's MS1 scan vector.
    pub column: u32,
    /// Position of the peak inside its (m/z sorted) spectrum.
    pub index_in_scan: u32,
}

/// All MS1 peaks of a run, flattened and sorted by m/z.
///
/// Built once per run and shared read-only by every candidate-mass query.
/// Peaks can be addressed three ways: by m/z range ([PeakIndex::query]),
/// by global position ([PeakIndex::get]), and by `(column, index_in_scan)`
/// ([PeakIndex::position]).
#[derive(Debug, Clone)]
pub struct PeakIndex {
    peaks: Vec<IndexedPeak>,
    scan_numbers: Arc<[u32]>,
    column_offsets: Vec<usize>,
    positions: Vec<u32>,
}

/// Statistics about the index building, meant for logging.
#[derive(Debug, Clone)]
pub struct PeakIndexStats {
    pub num_peaks: usize,
    pub num_columns: usize,
    pub num_missing_columns: usize,
    pub memory_usage_bytes: usize,
    pub sorting_time: std::time::Duration,
}

impl std::fmt::Display for PeakIndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Peak Index Stats:")?;
        writeln!(f, "Peaks: {}", self.num_peaks)?;
        writeln!(
            f,
            "Scan columns: {} ({} missing)",
            self.num_columns, self.num_missing_columns
        )?;
        writeln!(
            f,
            "Approximate memory: {:.2} MB",
            self.memory_usage_bytes as f64 / 1e6
        )?;
        writeln!(f, "Sorting time: {:.2?}", self.sorting_time)
    }
}

impl PeakIndex {
    /// Index every MS1 spectrum of the source.
    ///
    /// MS1 scans the source lists but cannot produce are kept as empty
    /// columns, so column numbers always line up with `ms1_scan_numbers`.
    pub fn from_source<S: SpectrumSource + ?Sized>(source: &S) -> (Self, PeakIndexStats) {
        let scan_numbers: Arc<[u32]> = source.ms1_scan_numbers().into();
        let mut missing = 0;
        let columns: Vec<&[Peak]> = scan_numbers
            .iter()
            .map(|&scan| match source.spectrum(scan) {
                Some(spec) => spec.peaks.as_slice(),
                None => {
                    warn!("MS1 scan {} listed but not available, treating as empty", scan);
                    missing += 1;
                    &[]
                }
            })
            .collect();
        let (index, mut stats) = Self::from_columns(scan_numbers.clone(), &columns);
        stats.num_missing_columns = missing;
        (index, stats)
    }

    /// Build the index from one peak slice per scan column.
    ///
    /// Each slice must already be sorted by m/z (as [crate::InMemoryRun] guarantees).
    ///
    /// NOTE: This internally uses `par_sort_unstable_by` to sort the peaks
    /// so it should not be called within a parallel loop.
    pub fn from_columns(scan_numbers: Arc<[u32]>, columns: &[&[Peak]]) -> (Self, PeakIndexStats) {
        let num_peaks: usize = columns.iter().map(|c| c.len()).sum();
        let mut peaks = Vec::with_capacity(num_peaks);
        let mut column_offsets = Vec::with_capacity(columns.len() + 1);
        column_offsets.push(0);
        for (col, col_peaks) in columns.iter().enumerate() {
            peaks.extend(col_peaks.iter().enumerate().map(|(i, p)| IndexedPeak {
                mz: p.mz,
                intensity: p.intensity,
                column: col as u32,
                index_in_scan: i as u32,
            }));
            column_offsets.push(peaks.len());
        }

        let st = std::time::Instant::now();
        // The full key makes the unstable sort deterministic.
        peaks.par_sort_unstable_by(|x, y| {
            x.mz.total_cmp(&y.mz)
                .then(x.column.cmp(&y.column))
                .then(x.index_in_scan.cmp(&y.index_in_scan))
        });
        let sorting_time = st.elapsed();

        let mut positions = vec![0u32; peaks.len()];
        for (global, p) in peaks.iter().enumerate() {
            positions[column_offsets[p.column as usize] + p.index_in_scan as usize] = global as u32;
        }

        let out = Self {
            peaks,
            scan_numbers,
            column_offsets,
            positions,
        };
        let stats = PeakIndexStats {
            num_peaks: out.peaks.len(),
            num_columns: out.num_columns(),
            num_missing_columns: 0,
            memory_usage_bytes: out.approximate_memory_usage(),
            sorting_time,
        };
        (out, stats)
    }

    fn approximate_memory_usage(&self) -> usize {
        self.peaks.len() * std::mem::size_of::<IndexedPeak>()
            + self.positions.len() * std::mem::size_of::<u32>()
            + self.column_offsets.len() * std::mem::size_of::<usize>()
            + self.scan_numbers.len() * std::mem::size_of::<u32>()
    }

    /// All peaks with m/z inside the (closed) range, in ascending m/z order.
    pub fn query(&self, mz_range: TupleRange<f64>) -> &[IndexedPeak] {
        let range = binary_search_range_by_key(&self.peaks, mz_range.as_tuple(), |p| p.mz);
        &self.peaks[range]
    }

    /// Same as [PeakIndex::query] but also yields the global position of each peak.
    pub fn query_with_positions(
        &self,
        mz_range: TupleRange<f64>,
    ) -> impl Iterator<Item = (u32, &IndexedPeak)> {
        let range = binary_search_range_by_key(&self.peaks, mz_range.as_tuple(), |p| p.mz);
        let start = range.start as u32;
        self.peaks[range]
            .iter()
            .enumerate()
            .map(move |(i, p)| (start + i as u32, p))
    }

    pub fn get(&self, position: u32) -> Option<&IndexedPeak> {
        self.peaks.get(position as usize)
    }

    /// Global position of the `index_in_scan`-th peak of a scan column.
    pub fn position(&self, column: u32, index_in_scan: u32) -> Option<u32> {
        let col = column as usize;
        if col + 1 >= self.column_offsets.len() {
            return None;
        }
        let flat = self.column_offsets[col] + index_in_scan as usize;
        if flat >= self.column_offsets[col + 1] {
            return None;
        }
        Some(self.positions[flat])
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.scan_numbers.len()
    }

    pub fn scan_numbers(&self) -> &Arc<[u32]> {
        &self.scan_numbers
    }

    pub fn scan_number(&self, column: u32) -> Option<u32> {
        self.scan_numbers.get(column as usize).copied()
    }

    /// Number of peaks in a scan column.
    pub fn column_len(&self, column: u32) -> usize {
        let col = column as usize;
        match (self.column_offsets.get(col), self.column_offsets.get(col + 1)) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    /// m/z span of the whole run, `None` for an index without peaks.
    pub fn mz_range(&self) -> Option<TupleRange<f64>> {
        match (self.peaks.first(), self.peaks.last()) {
            (Some(first), Some(last)) => TupleRange::try_new(first.mz, last.mz).ok(),
            _ => None,
        }
    }
}
