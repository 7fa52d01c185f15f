//! Satellite-to-ground optical link planning.
//!
//! Propagates a LEO orbit from classical elements, places it in Earth-fixed
//! coordinates and evaluates the optical downlink to a ground station:
//! range, pointing, Doppler factor and geometric coupling loss, with an
//! optional forecast-driven turbulence profile for the station.

pub mod config;
pub mod core;
pub mod link;
pub mod orbital;
pub mod scene;
pub mod stations;
