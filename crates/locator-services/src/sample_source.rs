//! Where the pipeline's IQ data comes from.
//!
//! Production uses [`LiveSamples`], which hands every report through
//! unchanged. Bench setups can swap in a source that replaces the samples
//! before they reach admission and the pipeline; the choice is made once,
//! when the locator is built.

use locator_core::{BdAddr, RawReport};

pub trait SampleSource: Send {
    /// Return the report to process for `tag`.
    fn samples(&mut self, tag: &BdAddr, report: RawReport) -> RawReport;
}

/// Reports as delivered by the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSamples;

impl SampleSource for LiveSamples {
    fn samples(&mut self, _tag: &BdAddr, report: RawReport) -> RawReport {
        report
    }
}
