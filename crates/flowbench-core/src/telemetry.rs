//! Telemetry line classification
//!
//! The rig emits free-form text interleaved with two structured line
//! shapes: valve toggle confirmations and comma-separated pressure
//! readings. [`parse`] turns one received line into zero or more
//! structured readings; anything it does not recognize is display-only
//! and yields nothing.

use serde::{Deserialize, Serialize};

/// Marker the firmware prints when a valve changes state. Doubles as the
/// acknowledgement prefix during bring-up.
pub const VALVE_MARKER: &str = "Toggle PIN";

/// Field separator in pressure report lines
pub const PRESSURE_SEPARATOR: &str = ", ";

/// One structured reading extracted from a telemetry line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Telemetry {
    /// A valve changed state: `Toggle PIN3 1` means pin 3 opened
    Valve {
        /// Pin identifier as printed by the firmware
        pin: String,
        /// New valve state, `"1"` open / `"0"` closed
        value: String,
    },
    /// One pressure channel reading; channels are 1-indexed
    Pressure {
        /// Pressure channel number
        channel: usize,
        /// Reading as printed by the firmware
        value: String,
    },
}

impl Telemetry {
    /// Destination label the display layer keys its widgets on
    /// (`PIN3`, `PRESS1`, ...).
    pub fn destination(&self) -> String {
        match self {
            Telemetry::Valve { pin, .. } => format!("PIN{pin}"),
            Telemetry::Pressure { channel, .. } => format!("PRESS{channel}"),
        }
    }

    /// The reading's raw value text
    pub fn value(&self) -> &str {
        match self {
            Telemetry::Valve { value, .. } => value,
            Telemetry::Pressure { value, .. } => value,
        }
    }
}

/// Classify one received line into structured readings.
///
/// Two-branch dispatch, not a grammar: the valve marker wins, otherwise
/// the presence of the pressure separator marks a pressure report, and
/// any other line is informational text (empty result).
///
/// Known limitation: a free-text line that happens to contain `", "` is
/// classified as a pressure report. The firmware avoids the separator in
/// its log output.
pub fn parse(line: &str) -> Vec<Telemetry> {
    let line = line.trim();

    if let Some(idx) = line.find(VALVE_MARKER) {
        // "Toggle PIN3 1" -> pin index, then the new state
        let rest = line[idx + VALVE_MARKER.len()..].trim();
        let mut parts = rest.split_whitespace();
        if let (Some(pin), Some(value)) = (parts.next(), parts.next()) {
            return vec![Telemetry::Valve {
                pin: pin.to_string(),
                value: value.to_string(),
            }];
        }
        // marker without index/value pair, treat as display-only
        return Vec::new();
    }

    if line.contains(PRESSURE_SEPARATOR) {
        return line
            .split(PRESSURE_SEPARATOR)
            .enumerate()
            .map(|(i, field)| Telemetry::Pressure {
                channel: i + 1,
                value: field.trim().to_string(),
            })
            .collect();
    }

    Vec::new()
}
