//! Per-tag state and the sample path: tag sessions and
//! their registry, the allow-list, admission control, the sample pipeline
//! and the capability traits it calls out to.

pub mod admission;
pub mod allowlist;
pub mod estimator;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod sample_source;
pub mod session;

pub use admission::{AdmissionControl, Decimator};
pub use allowlist::AllowList;
pub use estimator::{
    AngleEstimator, DistanceFilter, Estimate, EstimateError, EstimatorContext, EstimatorError,
    EstimatorFactory, EstimatorSettings, IqSamples,
};
pub use pipeline::{IqQuality, PipelineError, SamplePipeline};
pub use publish::{JsonLinesSink, ResultSink, TracingSink, VecSink};
pub use registry::{RegistryError, TagRegistry};
pub use sample_source::{LiveSamples, SampleSource};
pub use session::{SessionState, TagHandle, TagSession};
