use crate::models::spectrum::Spectrum;

/// Access to the spectra of an LC-MS run.
///
/// Implementations must be shareable across the worker threads of a sweep.
pub trait SpectrumSource: Sync {
    /// Scan numbers of all MS1 spectra, ascending.
    fn ms1_scan_numbers(&self) -> &[u32];

    /// The spectrum with the given scan number, peaks sorted by m/z.
    fn spectrum(&self, scan_number: u32) -> Option<&Spectrum>;

    /// Closest preceding scan one MS level up (the MS1 scan of an MS2 scan).
    fn precursor_scan_number(&self, scan_number: u32) -> Option<u32>;

    /// First scan after `scan_number` with the given MS level.
    fn next_scan_number(&self, scan_number: u32, ms_level: u8) -> Option<u32>;

    /// MS2 scans whose isolation window contains `mz`, ascending.
    ///
    /// Fragmentation scans without isolation information never match.
    fn fragmentation_scan_numbers(&self, mz: f64) -> Vec<u32>;
}
