//! Result sinks, where finished records go.
//!
//! Transport-specific publishers (message bus, telemetry) live outside this
//! crate and implement [`ResultSink`].

use std::io::Write;

use locator_core::ResultRecord;

pub trait ResultSink: Send {
    fn publish(&mut self, record: &ResultRecord);
}

/// Logs every record at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn publish(&mut self, record: &ResultRecord) {
        tracing::info!(
            topic = %record.topic(),
            azimuth = record.azimuth,
            elevation = record.elevation,
            distance = record.distance,
            seq = record.sequence,
            "angle result"
        );
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn publish(&mut self, record: &ResultRecord) {
        let written = serde_json::to_writer(&mut self.out, record)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(error = %e, topic = %record.topic(), "failed to write result");
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<ResultRecord>,
}

impl ResultSink for VecSink {
    fn publish(&mut self, record: &ResultRecord) {
        self.records.push(record.clone());
    }
}
