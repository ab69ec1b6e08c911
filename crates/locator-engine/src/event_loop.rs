//! The single event stream.
//!
//! Transport events arrive on an mpsc channel and are handled strictly one
//! at a time: each is carried through the locator to completion before the
//! next is received. Records go to the sink as they are produced. Errors
//! belong to one tag and are logged; they never stop the loop.

use tokio::sync::mpsc;

use locator_services::ResultSink;

use crate::binding::dispatch;
use crate::locator::{Locator, LocatorError};
use crate::transport::{TransportCommands, TransportEvent};

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub events: u64,
    pub published: u64,
    pub errors: u64,
}

/// Process events until the sender side closes. Returns the locator so the
/// caller can inspect or reuse it.
pub async fn run<T, S>(
    mut locator: Locator<T>,
    mut events: mpsc::Receiver<TransportEvent>,
    sink: &mut S,
) -> (Locator<T>, LoopStats)
where
    T: TransportCommands,
    S: ResultSink + ?Sized,
{
    let mut stats = LoopStats::default();
    tracing::info!(mode = ?locator.mode(), "locator event loop starting");

    while let Some(event) = events.recv().await {
        stats.events += 1;
        let kind = event.kind();
        match dispatch(&mut locator, event) {
            Ok(Some(record)) => {
                sink.publish(&record);
                stats.published += 1;
            }
            Ok(None) => {}
            Err(e) => {
                stats.errors += 1;
                log_error(kind, &e);
            }
        }
    }

    tracing::info!(
        events = stats.events,
        published = stats.published,
        errors = stats.errors,
        "event stream closed"
    );
    (locator, stats)
}

fn log_error(kind: &'static str, e: &LocatorError) {
    match e {
        LocatorError::Registry(_) => tracing::debug!(event = kind, error = %e, "event rejected"),
        _ => tracing::warn!(event = kind, error = %e, "event failed"),
    }
}
