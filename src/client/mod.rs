//! WebSocket client module
//!
//! Connects to the sensor, sends the greeting and forwards telemetry to a
//! display sink.

mod connection;
mod endpoint;

pub use connection::*;
pub use endpoint::*;
