//! The locator. Owns every tag session and exposes the operations the
//! binding adapters call.
//!
//! All operations run to completion on the caller's task, one event at a
//! time. Failures stay with the tag they belong to: a rejected command or a
//! bad report never touches another session.

use std::sync::Arc;

use locator_core::address::AddressParseError;
use locator_core::config::{ConfigError, LocatorConfig};
use locator_core::{device_id, AddressType, BdAddr, BindingMode, RawReport, ResultRecord};
use locator_services::estimator::{EstimatorFactory, EstimatorSettings};
use locator_services::{
    AdmissionControl, AllowList, LiveSamples, PipelineError, RegistryError, SampleSource,
    SamplePipeline, SessionState, TagHandle, TagRegistry, TagSession,
};

use crate::adv::{CTE_ENABLE_CHAR_UUID, CTE_SERVICE_UUID};
use crate::handshake::{Abort, HandshakeEngine, HandshakeEvent, Plan, Step};
use crate::transport::{CommandError, CteParameters, ScanMode, TransportCommands};

/// Value written to the CTE enable characteristic.
const CTE_ENABLE: [u8; 1] = [0x01];

#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("invalid allow-list entry: {0}")]
    AllowList(#[from] AddressParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("handshake with {handle} failed: {source}")]
    HandshakeFailed {
        handle: TagHandle,
        source: HandshakeError,
    },
    #[error("report from {tag} dropped: {source}")]
    Pipeline { tag: String, source: PipelineError },
}

/// Reason a session was torn down mid-handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("GATT procedure failed with status 0x{0:04x}")]
    ProcedureFailed(u16),
    #[error("CTE service not found")]
    ServiceNotFound,
    #[error("CTE enable characteristic not found")]
    CharacteristicNotFound,
}

impl From<Abort> for HandshakeError {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::ProcedureFailed(status) => Self::ProcedureFailed(status),
            Abort::ServiceNotFound => Self::ServiceNotFound,
            Abort::CharacteristicNotFound => Self::CharacteristicNotFound,
        }
    }
}

/// Where a sample report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSource {
    Handle(TagHandle),
    /// Proprietary broadcast reports carry only the sender's address.
    Address(BdAddr, AddressType),
}

pub struct Locator<T: TransportCommands> {
    transport: T,
    handshake: HandshakeEngine,
    registry: TagRegistry,
    allowlist: AllowList,
    admission: AdmissionControl,
    pipeline: SamplePipeline,
    source: Box<dyn SampleSource>,
    cte: CteParameters,
    locator_id: String,
}

impl<T: TransportCommands> Locator<T> {
    pub fn new(
        config: &LocatorConfig,
        transport: T,
        factory: Arc<dyn EstimatorFactory>,
    ) -> Result<Self, LocatorError> {
        let allowlist = AllowList::from_config(&config.tags.allowlist)?;
        config.validate()?;
        Ok(Self {
            transport,
            handshake: HandshakeEngine::new(config.binding.mode),
            registry: TagRegistry::new(
                config.tags.max_tags,
                factory,
                EstimatorSettings::from_config(config),
            ),
            allowlist,
            admission: AdmissionControl::new(config.admission.clone()),
            pipeline: SamplePipeline::from_config(config),
            source: Box::new(LiveSamples),
            cte: CteParameters::from_config(config),
            // Replaced by the boot identity
            locator_id: device_id(&BdAddr([0; 6]), AddressType::Public),
        })
    }

    /// Replace the pass-through sample source.
    pub fn with_sample_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.source = source;
        self
    }

    pub fn mode(&self) -> BindingMode {
        self.handshake.mode()
    }

    pub fn locator_id(&self) -> &str {
        &self.locator_id
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Shared handle for runtime allow-list changes.
    pub fn allowlist(&self) -> AllowList {
        self.allowlist.clone()
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Boot ──────────────────────────────────────────────────────────────────

    /// Radio is up. Adopt its identity and start looking for tags.
    pub fn on_boot(&mut self, address: BdAddr, address_type: AddressType) -> Result<(), LocatorError> {
        self.locator_id = device_id(&address, address_type);
        tracing::info!(
            locator = %self.locator_id,
            mode = ?self.mode(),
            admission = ?self.admission.scope(),
            "locator booted"
        );

        if self.mode() == BindingMode::Silabs {
            self.transport.enable_silabs_cte(&self.cte)?;
        }
        let mode = match self.mode() {
            BindingMode::Connection => ScanMode::Generic,
            BindingMode::Connectionless | BindingMode::Silabs => ScanMode::Observation,
        };
        self.start_scan(mode);
        Ok(())
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// A tag was seen advertising. Opens a link or sync if the tag is
    /// allowed, advertises the CTE service and is not tracked yet.
    ///
    /// A full table is reported as `CapacityExceeded`; nothing is opened.
    pub fn on_discovery(
        &mut self,
        address: BdAddr,
        address_type: AddressType,
        service_present: bool,
        adv_sid: u8,
    ) -> Result<(), LocatorError> {
        if !self.allowlist.is_allowed(&address) {
            return Ok(());
        }
        if !service_present || self.mode() == BindingMode::Silabs {
            return Ok(());
        }
        if self.registry.find_by_address(&address, address_type).is_some() {
            tracing::trace!(tag = %address, "already tracked");
            return Ok(());
        }
        if !self.registry.can_admit() {
            tracing::debug!(tag = %address, "tag table full, ignoring discovery");
            return Err(RegistryError::CapacityExceeded {
                max: self.registry.max_tags(),
            }
            .into());
        }

        let handle = match self.mode() {
            BindingMode::Connection => {
                TagHandle::Connection(self.transport.open_connection(address, address_type)?)
            }
            BindingMode::Connectionless => {
                TagHandle::Sync(self.transport.open_sync(address, address_type, adv_sid)?)
            }
            BindingMode::Silabs => return Ok(()),
        };

        let initial = self.handshake.initial_state();
        match self.registry.create(address, address_type, handle) {
            Ok(session) => {
                session.advance(initial);
                tracing::debug!(tag = %session.tag_id(), handle = %handle, state = %initial, "handshake started");
                Ok(())
            }
            Err(e) => {
                self.close_handle(handle);
                Err(e.into())
            }
        }
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    /// Advance the handshake of the session owning `handle`. Events for
    /// unknown handles and out-of-order events are dropped.
    ///
    /// A rejected command or failed step closes the session and is returned
    /// as `HandshakeFailed`.
    pub fn on_handshake_event(
        &mut self,
        handle: TagHandle,
        event: HandshakeEvent,
    ) -> Result<(), LocatorError> {
        let Some(session) = self.registry.find_by_handle_mut(handle) else {
            tracing::trace!(handle = %handle, ?event, "event for unknown handle");
            return Ok(());
        };

        let outcome = match self.handshake.plan(session, event) {
            Plan::Ignore => {
                tracing::trace!(tag = %session.tag_id(), state = %session.state(), ?event, "out-of-order event dropped");
                return Ok(());
            }
            Plan::Record(found) => {
                match found {
                    HandshakeEvent::ServiceFound(service) => session.service_ref = Some(service),
                    HandshakeEvent::CharacteristicFound(c) => session.characteristic_ref = Some(c),
                    _ => {}
                }
                return Ok(());
            }
            Plan::Abort(abort) => Err(HandshakeError::from(abort)),
            Plan::Run { steps, next } => {
                if event == HandshakeEvent::LinkOpened {
                    session.link_up = true;
                }
                match run_steps(&mut self.transport, &self.cte, session, steps) {
                    Ok(()) => {
                        if let Some(next) = next {
                            session.advance(next);
                            if next == SessionState::Running {
                                tracing::info!(tag = %session.tag_id(), handle = %handle, "session running");
                            }
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        };

        outcome.map_err(|source| self.teardown(handle, source))
    }

    /// Close a session whose handshake failed. Returns the error to report.
    fn teardown(&mut self, handle: TagHandle, source: HandshakeError) -> LocatorError {
        if let Some(session) = self.registry.find_by_handle_mut(handle) {
            tracing::warn!(tag = %session.tag_id(), state = %session.state(), error = %source, "handshake failed");
            session.advance(SessionState::Closed);
        }
        self.registry.remove(handle);
        self.close_handle(handle);
        self.rearm_scan();
        LocatorError::HandshakeFailed { handle, source }
    }

    // ── Samples ───────────────────────────────────────────────────────────────

    /// Process one sample report. Returns a record when the estimator
    /// produced a result.
    ///
    /// Reports for unknown handles, for sessions not yet running and reports
    /// shed by admission control yield `Ok(None)`.
    pub fn on_sample_report(
        &mut self,
        source: ReportSource,
        report: RawReport,
    ) -> Result<Option<ResultRecord>, LocatorError> {
        if report.is_empty() {
            return Ok(None);
        }

        let session = match source {
            ReportSource::Handle(handle) => match self.registry.find_by_handle_mut(handle) {
                Some(s) => s,
                None => {
                    tracing::trace!(handle = %handle, "report for unknown handle");
                    return Ok(None);
                }
            },
            ReportSource::Address(address, address_type) => {
                if self.handshake.mode() != BindingMode::Silabs {
                    return Ok(None);
                }
                if !self.allowlist.is_allowed(&address) {
                    return Ok(None);
                }
                let initial = self.handshake.initial_state();
                if self.registry.find_by_address(&address, address_type).is_none() {
                    let session = self.registry.create(address, address_type, TagHandle::None)?;
                    session.advance(initial);
                    tracing::info!(tag = %session.tag_id(), "session running");
                }
                match self.registry.find_by_address_mut(&address, address_type) {
                    Some(s) => s,
                    None => return Ok(None),
                }
            }
        };

        if !session.is_running() {
            tracing::trace!(tag = %session.tag_id(), state = %session.state(), "report before session running");
            return Ok(None);
        }

        let report = self.source.samples(&session.address(), report);

        if self.handshake.mode() == BindingMode::Silabs && !self.admission.admit(session) {
            return Ok(None);
        }

        match self.pipeline.process(session, &report) {
            Ok(Some(angle)) => Ok(Some(ResultRecord::new(
                session.tag_id().to_string(),
                self.locator_id.clone(),
                &angle,
            ))),
            Ok(None) => Ok(None),
            Err(source) => {
                tracing::warn!(tag = %session.tag_id(), error = %source, "report dropped");
                Err(LocatorError::Pipeline {
                    tag: session.tag_id().to_string(),
                    source,
                })
            }
        }
    }

    // ── Close ─────────────────────────────────────────────────────────────────

    /// The link or sync behind `handle` is gone. Unknown handles are fine.
    pub fn on_session_closed(&mut self, handle: TagHandle) {
        if let Some(session) = self.registry.find_by_handle_mut(handle) {
            session.advance(SessionState::Closed);
        }
        if self.registry.remove(handle) {
            tracing::info!(handle = %handle, "session closed");
        }
        self.rearm_scan();
    }

    /// Remove an address-keyed session. Returns false if none was tracked.
    pub fn forget_tag(&mut self, address: &BdAddr, address_type: AddressType) -> bool {
        self.registry.remove_by_address(address, address_type)
    }

    pub fn session(&self, address: &BdAddr, address_type: AddressType) -> Option<&TagSession> {
        self.registry.find_by_address(address, address_type)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Restart discovery after a session went live or went away. Only the
    /// silabs binding keeps observing; the others look for new tags.
    fn rearm_scan(&mut self) {
        let mode = match self.mode() {
            BindingMode::Connection | BindingMode::Connectionless => ScanMode::Generic,
            BindingMode::Silabs => ScanMode::Observation,
        };
        self.start_scan(mode);
    }

    /// Start the scanner; an already running scanner is fine.
    fn start_scan(&mut self, mode: ScanMode) {
        if let Err(e) = self.transport.start_scan(mode) {
            if !e.is_invalid_state() {
                tracing::warn!(error = %e, "failed to restart scanning");
            }
        }
    }

    /// Best-effort close of a link or sync.
    fn close_handle(&mut self, handle: TagHandle) {
        let closed = match handle {
            TagHandle::Connection(c) => self.transport.close_connection(c),
            TagHandle::Sync(s) => self.transport.close_sync(s),
            TagHandle::None => Ok(()),
        };
        if let Err(e) = closed {
            tracing::debug!(handle = %handle, error = %e, "close failed");
        }
    }
}

/// Issue the commands of one handshake step.
fn run_steps<T: TransportCommands>(
    transport: &mut T,
    cte: &CteParameters,
    session: &TagSession,
    steps: &[Step],
) -> Result<(), HandshakeError> {
    for &step in steps {
        let issued = issue(transport, cte, session, step);
        match issued {
            Ok(()) => {
                tracing::debug!(tag = %session.tag_id(), ?step, "handshake command issued");
            }
            Err(e) if step.is_fatal_on_failure() => return Err(e),
            Err(HandshakeError::Command(e)) if e.is_invalid_state() => {}
            Err(e) => {
                tracing::warn!(tag = %session.tag_id(), ?step, error = %e, "scanner command failed");
            }
        }
    }
    Ok(())
}

fn issue<T: TransportCommands>(
    transport: &mut T,
    cte: &CteParameters,
    session: &TagSession,
    step: Step,
) -> Result<(), HandshakeError> {
    let handle = session.handle();
    match (step, handle) {
        (Step::DiscoverServices, TagHandle::Connection(c)) => {
            transport.discover_services(c, &CTE_SERVICE_UUID)?
        }
        (Step::DiscoverCharacteristic, TagHandle::Connection(c)) => {
            let service = session.service_ref.ok_or(HandshakeError::ServiceNotFound)?;
            transport.discover_characteristic(c, service, &CTE_ENABLE_CHAR_UUID)?
        }
        (Step::WriteCteEnable, TagHandle::Connection(c)) => {
            let characteristic = session
                .characteristic_ref
                .ok_or(HandshakeError::CharacteristicNotFound)?;
            transport.write_characteristic(c, characteristic, &CTE_ENABLE)?
        }
        (Step::EnableConnectionCte, TagHandle::Connection(c)) => {
            transport.enable_connection_cte(c, cte)?
        }
        (Step::EnableConnectionlessCte, TagHandle::Sync(s)) => {
            transport.enable_connectionless_cte(s, cte)?
        }
        (Step::StopScan, _) => transport.stop_scan()?,
        (Step::StartScan, _) => transport.start_scan(ScanMode::Generic)?,
        // Step does not apply to this handle kind
        _ => {}
    }
    Ok(())
}
