//! Admission control: deterministic decimation of sample reports.
//!
//! A counter starts at `divider` and is decremented by every report. The
//! report that brings it to zero is admitted and the counter is reset to
//! `cadence`. Everything else is dropped, never queued.
//!
//!   divider = 3, cadence = 3: admits reports 3, 6, 9, ...
//!   divider = 11, cadence = 4: admits reports 11, 15, 19, ...

use locator_core::config::{AdmissionConfig, AdmissionScope};

use crate::session::TagSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimator {
    counter: u32,
    cadence: u32,
}

impl Decimator {
    /// Zero values are treated as 1 (admit every report).
    pub fn new(divider: u32, cadence: u32) -> Self {
        Self {
            counter: divider.max(1),
            cadence: cadence.max(1),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.divider, config.cadence)
    }

    /// Count one report. Returns true if it should be processed.
    pub fn admit(&mut self) -> bool {
        self.counter -= 1;
        if self.counter == 0 {
            self.counter = self.cadence;
            true
        } else {
            false
        }
    }

    /// Reports still to be dropped before the next admission.
    pub fn remaining(&self) -> u32 {
        self.counter
    }
}

/// Admission policy for a whole locator: one shared counter, or one per tag
/// kept on the session.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    config: AdmissionConfig,
    global: Decimator,
    dropped: u64,
}

impl AdmissionControl {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            global: Decimator::from_config(&config),
            config,
            dropped: 0,
        }
    }

    pub fn scope(&self) -> AdmissionScope {
        self.config.scope
    }

    /// Decide for one report belonging to `session`.
    pub fn admit(&mut self, session: &mut TagSession) -> bool {
        let admitted = match self.config.scope {
            AdmissionScope::Global => self.global.admit(),
            AdmissionScope::PerTag => session
                .decimator
                .get_or_insert_with(|| Decimator::from_config(&self.config))
                .admit(),
        };
        if admitted {
            tracing::trace!(tag = %session.tag_id(), "report admitted");
        } else {
            self.dropped += 1;
        }
        admitted
    }

    /// Reports shed so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
