/// Mass difference between the 13C and 12C isotopes, the spacing of an isotope envelope.
pub const C13_MINUS_C12: f64 = 1.003354835;
pub const PROTON_MASS: f64 = 1.007276466812;

/// m/z of the `isotope_index`-th isotope of a molecule with the given
/// monoisotopic (neutral) mass, protonated to `charge`.
///
/// ```
/// use ms1ft::utils::ion::{isotope_mz, monoisotopic_mass};
///
/// let mz = isotope_mz(10_000.0, 5, 3);
/// assert!((monoisotopic_mass(mz, 5, 3) - 10_000.0).abs() < 1e-9);
/// ```
#[inline]
pub fn isotope_mz(monoisotopic_mass: f64, charge: u32, isotope_index: u32) -> f64 {
    let charge = charge as f64;
    (monoisotopic_mass + isotope_index as f64 * C13_MINUS_C12 + charge * PROTON_MASS) / charge
}

#[inline]
pub fn monoisotopic_mass(mz: f64, charge: u32, isotope_index: u32) -> f64 {
    let charge = charge as f64;
    mz * charge - charge * PROTON_MASS - isotope_index as f64 * C13_MINUS_C12
}
