//! Station link analysis: geometric budget, atmospheric conditions and
//! global forecast fields.

pub mod atmosphere;
pub mod budget;
pub mod field;
pub mod weather;

pub use atmosphere::{AtmosphereQuery, AtmosphericProfile, TurbulenceModel, UpperAirWinds};
pub use budget::{LinkMetrics, OpticalConfig, compute_station_metrics};
pub use field::{WeatherField, WeatherFieldQuery, build_weather_field};
pub use weather::{AtmosphereChannels, OpenMeteoClient, start_atmosphere_worker};
