//! Repeating ground-track (resonant) orbit sizing

use std::f64::consts::TAU;

use crate::core::constants::{MU_EARTH_KM3_S2, SIDEREAL_DAY_S};

/// Semi-major axis (km) completing `orbits` revolutions in `rotations` sidereal days.
///
/// Closed form, no clamping: results outside the LEO band are valid but the
/// caller is expected to clamp them.
pub fn resonant_semi_major_axis_km(orbits: u32, rotations: u32) -> f64 {
    debug_assert!(orbits > 0 && rotations > 0, "resonance ratio must be positive");
    let period = (rotations as f64 / orbits as f64) * SIDEREAL_DAY_S;
    let ratio = period / TAU;
    (MU_EARTH_KM3_S2 * ratio * ratio).cbrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period_s(a_km: f64) -> f64 {
        TAU * (a_km.powi(3) / MU_EARTH_KM3_S2).sqrt()
    }

    #[test]
    fn test_fourteen_per_day_is_leo() {
        let a = resonant_semi_major_axis_km(14, 1);
        assert!(a > 7200.0 && a < 7300.0, "a = {}", a);
        let expected = SIDEREAL_DAY_S / 14.0;
        assert!((period_s(a) - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_one_to_one_is_geosynchronous() {
        let a = resonant_semi_major_axis_km(1, 1);
        assert!((a - 42_164.0).abs() < 1.0, "a = {}", a);
    }

    #[test]
    fn test_ratio_scaling() {
        // 29:2 and 14.5:1 describe the same period
        let a = resonant_semi_major_axis_km(29, 2);
        let period = period_s(a);
        assert!((period - 2.0 * SIDEREAL_DAY_S / 29.0).abs() < 1e-6);
    }
}
