//! Orbital mechanics module
//!
//! Two-body Keplerian propagation with an optional repeating ground-track
//! constraint, sampled into ECI/ECEF state vectors and a ground track.

pub mod elements;
pub mod kepler;
pub mod propagation;
pub mod resonance;

pub use elements::{OrbitalElements, ResonanceConfig};
pub use propagation::{PropagationResult, StateVector, propagate_orbit};
pub use resonance::resonant_semi_major_axis_km;
