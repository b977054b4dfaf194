//! Protocol message definitions
//!
//! The sensor speaks ad hoc JSON over a plain WebSocket. There is no envelope
//! and no version field: inbound frames are telemetry objects, outbound frames
//! are either the greeting handshake or a calibration request.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix of the greeting sent right after the connection opens
pub const HANDSHAKE_PREFIX: &str = "Connect ";

/// Highest value the sensor's 10-bit ADC can report
pub const ADC_MAX: u16 = 1023;

/// Dry reading at 3.0V used by the firmware until calibrated
pub const DEFAULT_DRY_READING: u16 = 727;

/// Wet reading at 3.0V used by the firmware until calibrated
pub const DEFAULT_WET_READING: u16 = 540;

/// Battery reading with two fresh AA cells
pub const DEFAULT_BATTERY_FULL_READING: u16 = 960;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Handshake
// ============================================================================

/// Render the greeting frame for a given instant
///
/// The server does not interpret it; it only ends up in the device log.
pub fn handshake_message<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{}{}",
        HANDSHAKE_PREFIX,
        now.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

// ============================================================================
// Inbound Telemetry
// ============================================================================

/// A telemetry frame broadcast by the sensor
///
/// Only `moisture` is required. The calibration firmware also reports raw and
/// percent values plus battery and temperature; those are kept when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorReading {
    /// Moisture value shown on the gauge
    pub moisture: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moisture_raw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moisture_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_raw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<f64>,
    /// Degrees Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl SensorReading {
    /// Decode a telemetry frame
    ///
    /// Optional fields that are missing or not numeric are left as `None`
    /// rather than rejecting the whole frame.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "expected a JSON object, got {}",
                    value_kind(&other)
                )))
            }
        };

        let moisture = match fields.get("moisture") {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
                ProtocolError::InvalidMessage("moisture is out of range".to_string())
            })?,
            Some(other) => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "moisture must be a number, got {}",
                    value_kind(other)
                )))
            }
            None => {
                return Err(ProtocolError::InvalidMessage(
                    "missing field `moisture`".to_string(),
                ))
            }
        };

        Ok(Self {
            moisture,
            moisture_raw: number_field(&fields, "moisture_raw"),
            moisture_percent: number_field(&fields, "moisture_percent"),
            battery: number_field(&fields, "battery"),
            battery_raw: number_field(&fields, "battery_raw"),
            battery_percent: number_field(&fields, "battery_percent"),
            temperature: number_field(&fields, "temperature"),
        })
    }
}

fn number_field(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    fields.get(name).and_then(Value::as_f64)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Outbound Calibration
// ============================================================================

/// Reference readings sent to the sensor's calibration wizard
///
/// The device stores them as its dry/wet readings at 3.0V and its full
/// battery reading, then restarts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalibrationRequest {
    /// ADC reading in dry soil
    pub dry: u16,
    /// ADC reading in wet soil
    pub wet: u16,
    /// ADC reading with a full battery
    pub battery: u16,
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self {
            dry: DEFAULT_DRY_READING,
            wet: DEFAULT_WET_READING,
            battery: DEFAULT_BATTERY_FULL_READING,
        }
    }
}

impl CalibrationRequest {
    /// Create a new calibration request
    pub fn new(dry: u16, wet: u16, battery: u16) -> Self {
        Self { dry, wet, battery }
    }

    /// Check the readings before they are written to the device
    pub fn validate(&self) -> ProtocolResult<()> {
        for (name, value) in [("dry", self.dry), ("wet", self.wet), ("battery", self.battery)] {
            if value > ADC_MAX {
                return Err(ProtocolError::ValidationError(format!(
                    "{} reading {} exceeds ADC maximum of {}",
                    name, value, ADC_MAX
                )));
            }
        }

        // The probe reads higher the drier the soil
        if self.dry <= self.wet {
            return Err(ProtocolError::ValidationError(format!(
                "dry reading ({}) must be greater than wet reading ({})",
                self.dry, self.wet
            )));
        }

        if self.battery == 0 {
            return Err(ProtocolError::ValidationError(
                "battery reading cannot be zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and serialize to the JSON frame the wizard expects
    pub fn to_json(&self) -> ProtocolResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }
}
