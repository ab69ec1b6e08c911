//! Raw CTE sample reports and the records produced from them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One CTE sample report, already stripped of transport framing.
///
/// `samples` holds alternating signed 8-bit I and Q values: the reference
/// period first, then one sweep per snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    /// Logical BLE channel the CTE was received on.
    pub channel: u8,
    /// Received signal strength (dBm).
    pub rssi: i8,
    /// Per-tag event / packet counter.
    pub sequence: u16,
    /// Interleaved I/Q bytes, reinterpreted as `i8`.
    pub samples: Bytes,
}

impl RawReport {
    /// Build a report from signed IQ values.
    pub fn from_iq(channel: u8, rssi: i8, sequence: u16, iq: &[i8]) -> Self {
        let samples: Vec<u8> = iq.iter().map(|&v| v as u8).collect();
        Self {
            channel,
            rssi,
            sequence,
            samples: Bytes::from(samples),
        }
    }

    /// Number of sample bytes carried.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples as signed values.
    pub fn iq(&self) -> impl Iterator<Item = i8> + '_ {
        self.samples.iter().map(|&b| b as i8)
    }
}

/// Most recent estimate for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleResult {
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    pub rssi: i8,
    pub channel: u8,
    pub sequence: u16,
}

/// Published form of an [`AngleResult`], tagged with who saw whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub tag_id: String,
    pub locator_id: String,
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    pub rssi: i8,
    pub channel: u8,
    pub sequence: u16,
}

impl ResultRecord {
    pub fn new(tag_id: String, locator_id: String, angle: &AngleResult) -> Self {
        Self {
            tag_id,
            locator_id,
            azimuth: angle.azimuth,
            elevation: angle.elevation,
            distance: angle.distance,
            rssi: angle.rssi,
            channel: angle.channel,
            sequence: angle.sequence,
        }
    }

    /// Topic the record is published under.
    pub fn topic(&self) -> String {
        format!("silabs/aoa/angle/{}/{}", self.locator_id, self.tag_id)
    }

    /// JSON payload for the publishing sink.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
