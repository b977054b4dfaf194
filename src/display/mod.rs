//! Display module
//!
//! Sinks that receive decoded moisture values and show them to the user.

mod gauge;

pub use gauge::*;
