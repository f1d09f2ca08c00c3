use super::spectrum::Spectrum;
use crate::errors::DataReadingError;
use crate::traits::SpectrumSource;
use tracing::debug;

/// A whole LC-MS run held in memory.
///
/// Spectra are kept sorted by scan number, peaks inside every spectrum
/// sorted by m/z.
#[derive(Debug, Clone)]
pub struct InMemoryRun {
    spectra: Vec<Spectrum>,
    ms1_scan_numbers: Vec<u32>,
    // (lower_mz, upper_mz, scan_number) of every MS2 scan, sorted by lower_mz.
    isolation_windows: Vec<(f64, f64, u32)>,
    max_isolation_width: f64,
}

impl InMemoryRun {
    /// Validates and sorts the spectra.
    ///
    /// Fails on duplicated scan numbers and on peaks with non-finite values.
    pub fn from_spectra(mut spectra: Vec<Spectrum>) -> Result<Self, DataReadingError> {
        spectra.sort_by_key(|s| s.scan_number);
        for pair in spectra.windows(2) {
            if pair[0].scan_number == pair[1].scan_number {
                return Err(DataReadingError::DuplicateScan(pair[0].scan_number));
            }
        }

        let mut num_unsorted = 0;
        for spec in spectra.iter_mut() {
            if let Some(bad) = spec.peaks.iter().find(|p| !p.is_finite()) {
                return Err(DataReadingError::InvalidSpectrum {
                    scan_number: spec.scan_number,
                    reason: format!("non-finite peak {:?}", bad),
                });
            }
            if spec.ms_level == 0 {
                return Err(DataReadingError::InvalidSpectrum {
                    scan_number: spec.scan_number,
                    reason: "ms level must be at least 1".to_string(),
                });
            }
            if !spec.peaks.is_sorted_by(|a, b| a.mz <= b.mz) {
                spec.peaks.sort_by(|a, b| a.cmp_mz(b));
                num_unsorted += 1;
            }
        }
        if num_unsorted > 0 {
            debug!("Sorted peaks of {} spectra by m/z", num_unsorted);
        }

        let ms1_scan_numbers = spectra
            .iter()
            .filter(|s| s.ms_level == 1)
            .map(|s| s.scan_number)
            .collect();

        let mut isolation_windows: Vec<(f64, f64, u32)> = spectra
            .iter()
            .filter(|s| s.ms_level == 2)
            .filter_map(|s| {
                s.isolation_window
                    .map(|w| (w.lower_mz(), w.upper_mz(), s.scan_number))
            })
            .collect();
        isolation_windows.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));
        let max_isolation_width = isolation_windows
            .iter()
            .map(|w| w.1 - w.0)
            .fold(0.0, f64::max);

        Ok(Self {
            spectra,
            ms1_scan_numbers,
            isolation_windows,
            max_isolation_width,
        })
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    fn spectrum_position(&self, scan_number: u32) -> Option<usize> {
        self.spectra
            .binary_search_by_key(&scan_number, |s| s.scan_number)
            .ok()
    }
}

impl SpectrumSource for InMemoryRun {
    fn ms1_scan_numbers(&self) -> &[u32] {
        &self.ms1_scan_numbers
    }

    fn spectrum(&self, scan_number: u32) -> Option<&Spectrum> {
        self.spectrum_position(scan_number)
            .map(|pos| &self.spectra[pos])
    }

    fn precursor_scan_number(&self, scan_number: u32) -> Option<u32> {
        let pos = self.spectrum_position(scan_number)?;
        let level = self.spectra[pos].ms_level;
        if level <= 1 {
            return None;
        }
        self.spectra[..pos]
            .iter()
            .rev()
            .find(|s| s.ms_level == level - 1)
            .map(|s| s.scan_number)
    }

    fn next_scan_number(&self, scan_number: u32, ms_level: u8) -> Option<u32> {
        let start = self
            .spectra
            .partition_point(|s| s.scan_number <= scan_number);
        self.spectra[start..]
            .iter()
            .find(|s| s.ms_level == ms_level)
            .map(|s| s.scan_number)
    }

    fn fragmentation_scan_numbers(&self, mz: f64) -> Vec<u32> {
        // Only windows starting within the widest window below mz can contain it.
        let lo = self
            .isolation_windows
            .partition_point(|w| w.0 < mz - self.max_isolation_width);
        let hi = self.isolation_windows.partition_point(|w| w.0 <= mz);
        let mut out: Vec<u32> = self.isolation_windows[lo..hi]
            .iter()
            .filter(|w| w.1 >= mz)
            .map(|w| w.2)
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::peak::Peak;
    use crate::models::spectrum::IsolationWindow;

    fn window(target_mz: f64) -> IsolationWindow {
        IsolationWindow {
            target_mz,
            lower_offset: 1.0,
            upper_offset: 1.0,
        }
    }

    fn sample_run() -> InMemoryRun {
        InMemoryRun::from_spectra(vec![
            Spectrum::new_ms2(2, window(800.0), vec![]),
            Spectrum::new_ms1(1, vec![Peak::new(500.0, 1.0)]),
            Spectrum::new_ms2(3, window(900.0), vec![]),
            Spectrum::new_ms1(4, vec![Peak::new(600.0, 2.0), Peak::new(400.0, 1.0)]),
            Spectrum::new_ms2(5, window(800.5), vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn test_ms1_scans_and_sorting() {
        let run = sample_run();
        assert_eq!(run.ms1_scan_numbers(), &[1, 4]);
        let spec = run.spectrum(4).unwrap();
        assert_eq!(spec.peaks[0].mz, 400.0);
        assert!(run.spectrum(42).is_none());
    }

    #[test]
    fn test_scan_navigation() {
        let run = sample_run();
        assert_eq!(run.precursor_scan_number(3), Some(1));
        assert_eq!(run.precursor_scan_number(5), Some(4));
        assert_eq!(run.precursor_scan_number(1), None);
        assert_eq!(run.next_scan_number(1, 2), Some(2));
        assert_eq!(run.next_scan_number(2, 1), Some(4));
        assert_eq!(run.next_scan_number(5, 1), None);
    }

    #[test]
    fn test_fragmentation_scans() {
        let run = sample_run();
        assert_eq!(run.fragmentation_scan_numbers(800.2), vec![2, 5]);
        assert_eq!(run.fragmentation_scan_numbers(900.9), vec![3]);
        assert!(run.fragmentation_scan_numbers(850.0).is_empty());
    }

    #[test]
    fn test_rejects_duplicates_and_nan() {
        let dup = InMemoryRun::from_spectra(vec![
            Spectrum::new_ms1(1, vec![]),
            Spectrum::new_ms1(1, vec![]),
        ]);
        assert!(matches!(dup, Err(DataReadingError::DuplicateScan(1))));

        let nan = InMemoryRun::from_spectra(vec![Spectrum::new_ms1(
            1,
            vec![Peak::new(f64::NAN, 1.0)],
        )]);
        assert!(matches!(
            nan,
            Err(DataReadingError::InvalidSpectrum { scan_number: 1, .. })
        ));
    }
}
