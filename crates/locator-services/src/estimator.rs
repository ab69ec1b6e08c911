//! Estimator capabilities: the angle engine and the distance utility.
//!
//! The locator does not do the direction-finding math itself. Each tag
//! session owns one [`EstimatorContext`], created through an
//! [`EstimatorFactory`] when the session is created and released when it is
//! removed.

use locator_core::config::LocatorConfig;
use locator_core::ArrayType;

/// Quality bits reported by the angle estimator.
pub mod quality {
    /// Phase jitter on the reference antenna.
    pub const REF_ANT_PHASE_JITTER: u32 = 1 << 0;
    /// Phase jitter on one of the switched antennas.
    pub const ANT_X_PHASE_JITTER: u32 = 1 << 1;
    /// Signal-to-noise-and-distortion ratio too low.
    pub const SNDR: u32 = 1 << 2;
}

/// Normalized samples of one report, as handed to the estimator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IqSamples {
    pub reference_i: Vec<f32>,
    pub reference_q: Vec<f32>,
    /// `[snapshot][element]`
    pub snapshot_i: Vec<Vec<f32>>,
    pub snapshot_q: Vec<Vec<f32>>,
}

/// One successful estimation round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub azimuth: f32,
    pub elevation: f32,
    /// Bitmask of [`quality`] flags. Zero means good.
    pub quality: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimateError {
    /// Not enough rounds accumulated yet. Not a failure.
    #[error("estimation in progress")]
    InProgress,
    #[error("estimation failed: {0}")]
    Failed(String),
}

/// Failure to allocate or release an estimator context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("estimator context: {0}")]
pub struct EstimatorError(pub String);

/// Per-session angle engine.
pub trait AngleEstimator: Send {
    fn estimate(
        &mut self,
        samples: &IqSamples,
        channel_frequency: f64,
    ) -> Result<Estimate, EstimateError>;

    /// Release engine resources. Called once, when the session is removed.
    fn deinit(&mut self) -> Result<(), EstimatorError> {
        Ok(())
    }
}

/// Per-session RSSI distance estimate and its smoothing state.
pub trait DistanceFilter: Send {
    /// Distance in metres for `rssi` given the power seen at 1 m.
    fn rssi_to_distance(&self, reference_power: f32, rssi: f32) -> f32;

    /// Feed one distance sample, return the smoothed value.
    fn smooth(&mut self, distance: f32) -> f32;
}

/// Everything a session needs to turn samples into a result.
pub struct EstimatorContext {
    pub angle: Box<dyn AngleEstimator>,
    pub distance: Box<dyn DistanceFilter>,
}

impl EstimatorContext {
    pub fn new(angle: Box<dyn AngleEstimator>, distance: Box<dyn DistanceFilter>) -> Self {
        Self { angle, distance }
    }
}

/// Parameters handed to the factory for each new context.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSettings {
    pub array_type: ArrayType,
    pub num_snapshots: usize,
    /// Azimuth band (degrees) the estimator should ignore.
    pub azimuth_mask: Option<(f32, f32)>,
    pub filtering_amount: f32,
}

impl EstimatorSettings {
    pub fn from_config(config: &LocatorConfig) -> Self {
        let array_type = config.array.array_type;
        let azimuth_mask = match (config.estimator.azimuth_mask_min, config.estimator.azimuth_mask_max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        };
        Self {
            array_type,
            num_snapshots: array_type.num_snapshots(),
            azimuth_mask,
            filtering_amount: config.estimator.filtering_amount,
        }
    }
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self::from_config(&LocatorConfig::default())
    }
}

/// Creates estimator contexts. Implemented by whatever wraps the real engine.
pub trait EstimatorFactory: Send + Sync {
    fn create(&self, settings: &EstimatorSettings) -> Result<EstimatorContext, EstimatorError>;
}

// ── Log-distance filter ───────────────────────────────────────────────────────

/// Free-space log-distance model with exponential smoothing.
///
/// `filtering_amount` is the weight kept from the previous value: 0 passes
/// samples through, values near 1 respond slowly.
#[derive(Debug, Clone)]
pub struct LogDistanceFilter {
    filtering_amount: f32,
    path_loss_exponent: f32,
    value: Option<f32>,
}

impl LogDistanceFilter {
    pub fn new(filtering_amount: f32) -> Self {
        Self {
            filtering_amount: filtering_amount.clamp(0.0, 1.0),
            path_loss_exponent: 2.0,
            value: None,
        }
    }
}

impl DistanceFilter for LogDistanceFilter {
    fn rssi_to_distance(&self, reference_power: f32, rssi: f32) -> f32 {
        10f32.powf((reference_power - rssi) / (10.0 * self.path_loss_exponent))
    }

    fn smooth(&mut self, distance: f32) -> f32 {
        let next = match self.value {
            None => distance,
            Some(prev) => self.filtering_amount * prev + (1.0 - self.filtering_amount) * distance,
        };
        self.value = Some(next);
        next
    }
}
