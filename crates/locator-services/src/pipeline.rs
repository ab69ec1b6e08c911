//! Sample pipeline: raw IQ report in, angle result out.
//!
//! 1. Bounds-check the report against the configured array geometry.
//! 2. Split it into the reference period and the antenna snapshots,
//!    normalizing each signed byte to -1.0..=1.0.
//! 3. Run the session's angle estimator on the channel's centre frequency.
//! 4. Derive and smooth a distance from RSSI.
//! 5. Store the result on the session.
//!
//! "In progress" from the estimator yields no result and is not an error.

use locator_core::config::LocatorConfig;
use locator_core::geometry::channel_frequency;
use locator_core::{AngleResult, ArrayGeometry, RawReport};

use crate::estimator::{quality, EstimateError, IqSamples};
use crate::session::TagSession;

/// Largest magnitude of a signed 8-bit sample.
const SAMPLE_SCALE: f32 = 127.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("report carries {actual} sample bytes, array expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid channel {0}")]
    InvalidChannel(u8),
    #[error("estimator: {0}")]
    Estimator(String),
}

/// Advisory label for an estimator quality bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqQuality {
    Good,
    PhaseJitter,
    LowSignalQuality,
    Other,
}

impl IqQuality {
    /// Phase jitter wins over SNDR when both are flagged.
    pub fn classify(mask: u32) -> Self {
        if mask == 0 {
            Self::Good
        } else if mask & (quality::REF_ANT_PHASE_JITTER | quality::ANT_X_PHASE_JITTER) != 0 {
            Self::PhaseJitter
        } else if mask & quality::SNDR != 0 {
            Self::LowSignalQuality
        } else {
            Self::Other
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::PhaseJitter => "caution: phase jitter too large",
            Self::LowSignalQuality => "caution: reference period SNDR too low",
            Self::Other => "caution: other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplePipeline {
    geometry: ArrayGeometry,
    tag_tx_power: f32,
}

impl SamplePipeline {
    pub fn new(geometry: ArrayGeometry, tag_tx_power: f32) -> Self {
        Self {
            geometry,
            tag_tx_power,
        }
    }

    pub fn from_config(config: &LocatorConfig) -> Self {
        Self::new(
            ArrayGeometry::new(config.array.array_type),
            config.estimator.tag_tx_power,
        )
    }

    pub fn geometry(&self) -> &ArrayGeometry {
        &self.geometry
    }

    /// Split and normalize a report. Nothing is copied unless the length
    /// matches the geometry exactly.
    pub fn extract(&self, report: &RawReport) -> Result<IqSamples, PipelineError> {
        let expected = self.geometry.expected_len();
        if report.len() != expected {
            return Err(PipelineError::LengthMismatch {
                expected,
                actual: report.len(),
            });
        }

        let values: Vec<f32> = report.iq().map(|v| v as f32 / SAMPLE_SCALE).collect();
        let (reference, snapshots) = values.split_at(self.geometry.reference_len());

        let mut samples = IqSamples {
            reference_i: Vec::with_capacity(self.geometry.ref_samples),
            reference_q: Vec::with_capacity(self.geometry.ref_samples),
            snapshot_i: Vec::with_capacity(self.geometry.snapshots),
            snapshot_q: Vec::with_capacity(self.geometry.snapshots),
        };
        for pair in reference.chunks_exact(2) {
            samples.reference_i.push(pair[0]);
            samples.reference_q.push(pair[1]);
        }
        // One row per snapshot, I and Q interleaved per element
        for row in snapshots.chunks_exact(2 * self.geometry.elements) {
            samples.snapshot_i.push(row.iter().step_by(2).copied().collect());
            samples.snapshot_q.push(row.iter().skip(1).step_by(2).copied().collect());
        }
        Ok(samples)
    }

    /// Run one admitted report through the session's estimator.
    ///
    /// `Ok(None)` means the estimator needs more rounds. Errors leave the
    /// session, including `last_result`, untouched.
    pub fn process(
        &self,
        session: &mut TagSession,
        report: &RawReport,
    ) -> Result<Option<AngleResult>, PipelineError> {
        let frequency =
            channel_frequency(report.channel).ok_or(PipelineError::InvalidChannel(report.channel))?;
        let samples = self.extract(report)?;

        let estimate = match session.estimator.angle.estimate(&samples, frequency) {
            Ok(e) => e,
            Err(EstimateError::InProgress) => {
                tracing::trace!(tag = %session.tag_id(), seq = report.sequence, "estimation in progress");
                return Ok(None);
            }
            Err(EstimateError::Failed(reason)) => return Err(PipelineError::Estimator(reason)),
        };

        let distance = session
            .estimator
            .distance
            .rssi_to_distance(self.tag_tx_power, report.rssi as f32);
        let distance = session.estimator.distance.smooth(distance);

        let label = IqQuality::classify(estimate.quality);
        tracing::debug!(
            tag = %session.tag_id(),
            azimuth = estimate.azimuth,
            elevation = estimate.elevation,
            distance,
            rssi = report.rssi,
            channel = report.channel,
            seq = report.sequence,
            quality = label.describe(),
            "angle estimated"
        );

        let result = AngleResult {
            azimuth: estimate.azimuth,
            elevation: estimate.elevation,
            distance,
            rssi: report.rssi,
            channel: report.channel,
            sequence: report.sequence,
        };
        session.last_result = Some(result);
        Ok(Some(result))
    }
}
