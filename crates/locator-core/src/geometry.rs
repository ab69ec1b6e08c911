//! Antenna array geometry and channel frequencies.
//!
//! The geometry is a deployment constant: it fixes how many IQ pairs a CTE
//! report carries and how they split into the reference period and the
//! antenna snapshots. Nothing here is derived from a report.

use serde::{Deserialize, Serialize};

/// IQ samples taken on the reference antenna before switching starts.
pub const REF_PERIOD_SAMPLES: usize = 7;

/// Number of logical BLE channels.
pub const NUM_CHANNELS: usize = 40;

/// Supported antenna boards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayType {
    #[default]
    #[serde(rename = "ura_4x4")]
    Ura4x4,
    #[serde(rename = "ura_3x3")]
    Ura3x3,
    #[serde(rename = "ula_1x4")]
    Ula1x4,
}

impl ArrayType {
    /// Antenna sweeps per CTE.
    pub fn num_snapshots(self) -> usize {
        match self {
            Self::Ura4x4 | Self::Ura3x3 => 4,
            Self::Ula1x4 => 18,
        }
    }

    pub fn num_elements(self) -> usize {
        match self {
            Self::Ura4x4 => 16,
            Self::Ura3x3 => 9,
            Self::Ula1x4 => 4,
        }
    }

    /// Antenna switching pattern handed to the radio when CTE reception
    /// is enabled.
    pub fn switching_pattern(self) -> &'static [u8] {
        match self {
            Self::Ura4x4 => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
            Self::Ura3x3 => &[1, 2, 3, 5, 6, 7, 9, 10, 11],
            Self::Ula1x4 => &[0, 1, 2, 3],
        }
    }
}

impl std::str::FromStr for ArrayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ura_4x4" => Ok(Self::Ura4x4),
            "ura_3x3" => Ok(Self::Ura3x3),
            "ula_1x4" => Ok(Self::Ula1x4),
            other => Err(format!("unknown array type '{other}'")),
        }
    }
}

/// Resolved sample layout for one array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayGeometry {
    pub array_type: ArrayType,
    pub ref_samples: usize,
    pub snapshots: usize,
    pub elements: usize,
}

impl ArrayGeometry {
    pub fn new(array_type: ArrayType) -> Self {
        Self {
            array_type,
            ref_samples: REF_PERIOD_SAMPLES,
            snapshots: array_type.num_snapshots(),
            elements: array_type.num_elements(),
        }
    }

    /// Bytes occupied by the reference period (I and Q per sample).
    pub fn reference_len(&self) -> usize {
        self.ref_samples * 2
    }

    /// Bytes a well-formed report must carry.
    pub fn expected_len(&self) -> usize {
        2 * (self.ref_samples + self.snapshots * self.elements)
    }
}

impl From<ArrayType> for ArrayGeometry {
    fn from(array_type: ArrayType) -> Self {
        Self::new(array_type)
    }
}

const LOGICAL_TO_PHYSICAL: [u8; NUM_CHANNELS] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
    28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 0, 12, 39,
];

/// Centre frequency in Hz of a logical BLE channel, or `None` for an
/// index outside 0..40.
pub fn channel_frequency(channel: u8) -> Option<f64> {
    LOGICAL_TO_PHYSICAL
        .get(channel as usize)
        .map(|&physical| 2_402_000_000.0 + 2_000_000.0 * physical as f64)
}
