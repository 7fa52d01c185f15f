//! Core coordinate utilities
//!
//! Frame transforms used by the propagator and the link engine:
//! - perifocal -> ECI rotation from the angular orbital elements
//! - ECI -> ECEF rotation by a constant-rate Earth rotation angle
//! - ECEF <-> geodetic on a spherical Earth
//! - local East-North-Up basis at a ground point
//!
//! Every function here is pure; nothing caches state between calls.

use bevy::math::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::constants::{EARTH_RADIUS_KM, EARTH_ROT_RATE_RAD_S};

// ========================= Geographic coordinates and helpers =========================

#[derive(Debug, Clone, PartialEq)]
pub struct CoordError {
    pub msg: String,
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for CoordError {}

/// Geodetic position on the spherical Earth model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geodetic {
    pub lat_deg: f64,
    pub lon_deg: f64,
    /// Height above the spherical radius in km
    pub alt_km: f64,
}

impl Geodetic {
    pub fn new(lat_deg: f64, lon_deg: f64, alt_km: f64) -> Self {
        Self {
            lat_deg,
            lon_deg,
            alt_km,
        }
    }

    /// Validated constructor for user-supplied ground points.
    pub fn from_degrees(lat_deg: f64, lon_deg: f64, alt_km: f64) -> Result<Self, CoordError> {
        validate_lat_lon(lat_deg, lon_deg)?;
        Ok(Self::new(lat_deg, lon_deg, alt_km))
    }

    pub fn to_ecef_km(&self) -> DVec3 {
        geodetic_to_ecef_km(self)
    }
}

/// Range check for a latitude/longitude pair in degrees.
pub fn validate_lat_lon(lat_deg: f64, lon_deg: f64) -> Result<(), CoordError> {
    if !(-90.0..=90.0).contains(&lat_deg) {
        return Err(CoordError {
            msg: format!("Invalid latitude: {:?}", lat_deg),
        });
    }
    if !(-180.0..=180.0).contains(&lon_deg) {
        return Err(CoordError {
            msg: format!("Invalid longitude: {:?}", lon_deg),
        });
    }
    Ok(())
}

/// Wrap a longitude in degrees into (-180, 180].
pub fn wrap_longitude_deg(lon_deg: f64) -> f64 {
    let wrapped = (lon_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { wrapped + 360.0 } else { wrapped }
}

/// Spherical-Earth inverse: ECEF (km) -> latitude, longitude, altitude.
pub fn ecef_to_geodetic(ecef_km: DVec3) -> Geodetic {
    let lon = ecef_km.y.atan2(ecef_km.x);
    let lat = ecef_km.z.atan2(ecef_km.x.hypot(ecef_km.y));
    Geodetic {
        lat_deg: lat.to_degrees(),
        lon_deg: lon.to_degrees(),
        alt_km: ecef_km.length() - EARTH_RADIUS_KM,
    }
}

/// Geodetic -> ECEF (km) on the spherical Earth.
pub fn geodetic_to_ecef_km(geo: &Geodetic) -> DVec3 {
    let lat = geo.lat_deg.to_radians();
    let lon = geo.lon_deg.to_radians();
    let r = EARTH_RADIUS_KM + geo.alt_km;
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DVec3::new(r * cos_lat * cos_lon, r * cos_lat * sin_lon, r * sin_lat)
}

/// Local East-North-Up basis at a ground point.
///
/// The returned matrix has rows (east, north, up), so `enu * delta_ecef`
/// yields the (east, north, up) components of a relative ECEF vector.
pub fn enu_basis(lat_deg: f64, lon_deg: f64) -> DMat3 {
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();

    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

    DMat3::from_cols(east, north, up).transpose()
}

// ========================= Orbital/Earth-frame transformations =========================

/// Rotation taking perifocal (PQW) vectors into ECI.
///
/// Standard 3-1-3 composition `Rz(raan) * Rx(inc) * Rz(argp)`, angles in radians.
pub fn perifocal_to_eci_matrix(inc_rad: f64, raan_rad: f64, argp_rad: f64) -> DMat3 {
    DMat3::from_rotation_z(raan_rad) * DMat3::from_rotation_x(inc_rad) * DMat3::from_rotation_z(argp_rad)
}

/// Earth rotation angle after `t_s` seconds from epoch (simplified Greenwich angle).
pub fn earth_rotation_angle_rad(t_s: f64) -> f64 {
    EARTH_ROT_RATE_RAD_S * t_s
}

/// Rotate ECI -> ECEF about Z.
/// Standard transformation rotates by -theta (clockwise when viewed from +Z)
pub fn eci_to_ecef_km(eci: DVec3, theta: f64) -> DVec3 {
    let (s, c) = theta.sin_cos();
    let x = c * eci.x + s * eci.y;
    let y = -s * eci.x + c * eci.y;
    DVec3::new(x, y, eci.z)
}

/// ECI velocity -> velocity relative to the rotating Earth frame.
///
/// Rotates like a position, then removes the transport term `omega x r_ecef`.
pub fn eci_to_ecef_velocity_km_s(v_eci: DVec3, r_ecef: DVec3, theta: f64) -> DVec3 {
    let omega = DVec3::new(0.0, 0.0, EARTH_ROT_RATE_RAD_S);
    eci_to_ecef_km(v_eci, theta) - omega.cross(r_ecef)
}

// =================================== Tests ===================================
