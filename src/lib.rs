//! Sound Meter: live loudness metering for 16 kHz mono PCM16 streams
//!
//! [`audio::level::estimate_level`] turns one chunk of raw bytes into a level,
//! [`audio::meter::MeterState`] tracks the current level, the peak since the
//! last reset and the meter fill ratio. Everything else here is capture,
//! configuration and presentation around those two.

pub mod audio;
pub mod config;
pub mod controller;
pub mod display;
pub mod paths;
pub mod preflight;
pub mod validation;
