//! Kepler equation solver using Newton's method.

use std::f64::consts::PI;

/// Iteration cap for the Newton solve.
pub const MAX_ITERATIONS: usize = 20;

/// Stop once the Newton step falls below this (radians).
pub const TOLERANCE: f64 = 1e-8;

/// Solve Kepler's equation `E - e*sin(E) = M` for the eccentric anomaly.
///
/// Starts from `E = M`, or `E = pi` when `e > 0.8`. Never fails: if the step
/// has not dropped below [`TOLERANCE`] after [`MAX_ITERATIONS`] the current
/// estimate is returned as-is.
pub fn solve_eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    debug_assert!(
        (0.0..1.0).contains(&eccentricity),
        "eccentricity must be in [0, 1), got {}",
        eccentricity
    );

    let mut e_anomaly = if eccentricity > 0.8 { PI } else { mean_anomaly };

    for _ in 0..MAX_ITERATIONS {
        let (sin_e, cos_e) = e_anomaly.sin_cos();
        let f = e_anomaly - eccentricity * sin_e - mean_anomaly;
        let f_prime = 1.0 - eccentricity * cos_e;
        let delta = f / f_prime;
        e_anomaly -= delta;
        if delta.abs() < TOLERANCE {
            break;
        }
    }

    e_anomaly
}

/// True anomaly from eccentric anomaly, full-quadrant via atan2.
pub fn eccentric_to_true_anomaly(eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    let (sin_e, cos_e) = eccentric_anomaly.sin_cos();
    let y = (1.0 - eccentricity * eccentricity).sqrt() * sin_e;
    let x = cos_e - eccentricity;
    y.atan2(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_circular_orbit_is_identity() {
        for i in 0..16 {
            let m = i as f64 * TAU / 16.0;
            let e = solve_eccentric_anomaly(m, 0.0);
            assert!((e - m).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kepler_roundtrip_dense_grid() {
        // e in [0, 0.95], M in [0, 2pi)
        for ei in 0..=95 {
            let ecc = ei as f64 / 100.0;
            for mi in 0..72 {
                let m = mi as f64 * TAU / 72.0;
                let e_anomaly = solve_eccentric_anomaly(m, ecc);
                let m_back = e_anomaly - ecc * e_anomaly.sin();
                assert!(
                    (m_back - m).abs() < 1e-6,
                    "e={} M={} -> E={} M'={}",
                    ecc,
                    m,
                    e_anomaly,
                    m_back
                );
            }
        }
    }

    #[test]
    fn test_high_eccentricity_start() {
        // Near periapsis with e close to 1: the pi start still lands on the root
        let ecc = 0.95;
        let m = 0.01;
        let e_anomaly = solve_eccentric_anomaly(m, ecc);
        assert!((e_anomaly - ecc * e_anomaly.sin() - m).abs() < 1e-6);
    }

    #[test]
    fn test_eccentric_to_true_anomaly_quadrants() {
        let ecc = 0.3;
        // Periapsis and apoapsis are fixed points
        assert!(eccentric_to_true_anomaly(0.0, ecc).abs() < 1e-12);
        assert!((eccentric_to_true_anomaly(PI, ecc).abs() - PI).abs() < 1e-12);

        // True anomaly leads eccentric anomaly on the outbound half
        let nu = eccentric_to_true_anomaly(1.0, ecc);
        assert!(nu > 1.0 && nu < PI);

        // And is symmetric about the apse line
        let nu_neg = eccentric_to_true_anomaly(-1.0, ecc);
        assert!((nu + nu_neg).abs() < 1e-12);
    }

    #[test]
    fn test_true_anomaly_circular_matches_eccentric() {
        for i in 1..8 {
            let e_anomaly = i as f64 * 0.7 - 2.5;
            let nu = eccentric_to_true_anomaly(e_anomaly, 0.0);
            assert!((nu - e_anomaly).abs() < 1e-12);
        }
    }
}
