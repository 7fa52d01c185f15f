//! Physical constants shared by the propagation and link engines.
//!
//! Earth is a perfect sphere rotating at a constant rate; there is no
//! precession, nutation or ellipsoid flattening anywhere in the crate.

/// Mean spherical Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Earth gravitational parameter (km^3/s^2).
pub const MU_EARTH_KM3_S2: f64 = 398_600.4418;

/// Constant Earth rotation rate (rad/s) used for the ECI -> ECEF angle.
pub const EARTH_ROT_RATE_RAD_S: f64 = 7.292_115_9e-5;

/// Sidereal day in seconds, used for ground-track resonance timing.
pub const SIDEREAL_DAY_S: f64 = 86_164.0905;

/// Speed of light in vacuum (km/s).
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Lower edge of the supported LEO semi-major axis band (km).
pub const MIN_SEMI_MAJOR_AXIS_KM: f64 = 6600.0;

/// Upper edge of the supported LEO semi-major axis band (km).
pub const MAX_SEMI_MAJOR_AXIS_KM: f64 = 9000.0;

/// Orbits propagated when no resonance constraint fixes the span.
pub const DEFAULT_TOTAL_ORBITS: u32 = 3;

/// Clamp a semi-major axis into the supported LEO band.
pub fn clamp_semi_major_axis_km(a_km: f64) -> f64 {
    a_km.clamp(MIN_SEMI_MAJOR_AXIS_KM, MAX_SEMI_MAJOR_AXIS_KM)
}
