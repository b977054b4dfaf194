//! Wire protocol module
//!
//! Frames exchanged with the soil sensor's WebSocket server: the greeting
//! handshake, inbound telemetry and the calibration request.

mod messages;

pub use messages::*;
