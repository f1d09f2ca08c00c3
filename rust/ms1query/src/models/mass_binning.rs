use serde::{
    Deserialize,
    Serialize,
};

/// Bins masses by truncating the mantissa of their `f32` representation.
///
/// Keeping `num_bits` of the float (sign + exponent + leading mantissa bits)
/// gives bins with a constant relative width of `2^-(num_bits - 9)`.
/// With the default of 27 bits that is ~3.8 ppm, small enough that the
/// bins of a sweep cover a mass range without gaps or overlaps.
///
/// ```
/// use ms1query::MassBinning;
///
/// let binning = MassBinning::default();
/// let bin = binning.bin_number(10_000.0);
/// assert!(binning.bin_start(bin) <= 10_000.0);
/// assert!(10_000.0 < binning.bin_end(bin));
/// assert_eq!(binning.bin_end(bin), binning.bin_start(bin + 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassBinning {
    num_bits: u8,
}

impl Default for MassBinning {
    fn default() -> Self {
        Self { num_bits: 27 }
    }
}

impl MassBinning {
    /// `num_bits` is clamped to `[10, 32]`: at least one mantissa bit is kept.
    pub fn new(num_bits: u8) -> Self {
        Self {
            num_bits: num_bits.clamp(10, 32),
        }
    }

    pub fn num_bits(&self) -> u8 {
        self.num_bits
    }

    fn shift(&self) -> u32 {
        32 - self.num_bits as u32
    }

    /// Only meaningful for positive, finite values.
    pub fn bin_number(&self, value: f64) -> u32 {
        (value as f32).to_bits() >> self.shift()
    }

    pub fn bin_start(&self, bin: u32) -> f64 {
        f32::from_bits(bin << self.shift()) as f64
    }

    pub fn bin_end(&self, bin: u32) -> f64 {
        self.bin_start(bin.saturating_add(1))
    }

    pub fn bin_center(&self, bin: u32) -> f64 {
        0.5 * (self.bin_start(bin) + self.bin_end(bin))
    }
}
