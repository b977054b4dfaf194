//! Configuration module
//!
//! Loads device and gauge settings for the monitor.

mod settings;

pub use settings::*;
