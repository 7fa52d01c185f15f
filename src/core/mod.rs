//! Earth model constants and reference-frame conversions.

pub mod constants;
pub mod coordinates;
