//! Session handshake engine, one transition table per binding mode.
//!
//! The engine is pure: [`HandshakeEngine::plan`] looks at a session and an
//! inbound event and says what should happen. The [`Locator`](crate::Locator)
//! carries the plan out against the transport and the registry.
//!
//! Connection binding (one command per completed step):
//!
//! | state                    | event                    | commands                    | next                     |
//! |--------------------------|--------------------------|-----------------------------|--------------------------|
//! | Connecting               | link opened              | discover services           | -                        |
//! | Connecting               | procedure ok, service    | discover characteristic     | ServicesDiscovered       |
//! | ServicesDiscovered       | procedure ok, char       | write 0x01 to characteristic| CharacteristicDiscovered |
//! | CharacteristicDiscovered | procedure ok             | enable CTE, start scan      | Running                  |
//!
//! Connectionless binding: `Syncing` + sync opened → stop scan, enable CTE,
//! start scan → `Running`.
//!
//! Proprietary broadcast binding: no handshake.

use locator_core::BindingMode;
use locator_services::{SessionState, TagSession};

/// A handshake step outcome reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    LinkOpened,
    /// The CTE service was found on the tag.
    ServiceFound(u32),
    /// The CTE enable characteristic was found.
    CharacteristicFound(u16),
    /// The outstanding GATT procedure finished; `Err` carries its status.
    ProcedureCompleted(Result<(), u16>),
    SyncOpened,
}

/// One outbound command of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    DiscoverServices,
    DiscoverCharacteristic,
    WriteCteEnable,
    EnableConnectionCte,
    EnableConnectionlessCte,
    StopScan,
    StartScan,
}

impl Step {
    /// Scanner commands only affect discovery of other tags; their failure
    /// does not end the session.
    pub fn is_fatal_on_failure(self) -> bool {
        !matches!(self, Self::StopScan | Self::StartScan)
    }
}

/// Why a handshake was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abort {
    /// A GATT procedure completed with a failure status.
    ProcedureFailed(u16),
    ServiceNotFound,
    CharacteristicNotFound,
}

/// What to do with one handshake event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Out of order or not applicable. Dropped.
    Ignore,
    /// Store a discovered endpoint; no command, no transition.
    Record(HandshakeEvent),
    /// Issue `steps` in order, then move to `next` if given.
    Run {
        steps: &'static [Step],
        next: Option<SessionState>,
    },
    /// Tear the session down.
    Abort(Abort),
}

#[derive(Debug, Clone, Copy)]
pub struct HandshakeEngine {
    mode: BindingMode,
}

impl HandshakeEngine {
    pub fn new(mode: BindingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// State a session enters once its first command has been issued.
    pub fn initial_state(&self) -> SessionState {
        match self.mode {
            BindingMode::Connection => SessionState::Connecting,
            BindingMode::Connectionless => SessionState::Syncing,
            BindingMode::Silabs => SessionState::Running,
        }
    }

    pub fn plan(&self, session: &TagSession, event: HandshakeEvent) -> Plan {
        match self.mode {
            BindingMode::Connection => plan_connection(session, event),
            BindingMode::Connectionless => plan_connectionless(session, event),
            BindingMode::Silabs => Plan::Ignore,
        }
    }
}

fn plan_connection(session: &TagSession, event: HandshakeEvent) -> Plan {
    use HandshakeEvent::*;
    use SessionState::*;

    match (session.state(), event) {
        (Connecting, LinkOpened) if !session.link_up => Plan::Run {
            steps: &[Step::DiscoverServices],
            next: None,
        },
        (Connecting, ServiceFound(_)) if session.link_up => Plan::Record(event),
        (ServicesDiscovered, CharacteristicFound(_)) => Plan::Record(event),

        (Connecting | ServicesDiscovered | CharacteristicDiscovered, ProcedureCompleted(Err(status)))
            if session.link_up =>
        {
            Plan::Abort(Abort::ProcedureFailed(status))
        }

        (Connecting, ProcedureCompleted(Ok(()))) if session.link_up => match session.service_ref {
            Some(_) => Plan::Run {
                steps: &[Step::DiscoverCharacteristic],
                next: Some(ServicesDiscovered),
            },
            None => Plan::Abort(Abort::ServiceNotFound),
        },
        (ServicesDiscovered, ProcedureCompleted(Ok(()))) => match session.characteristic_ref {
            Some(_) => Plan::Run {
                steps: &[Step::WriteCteEnable],
                next: Some(CharacteristicDiscovered),
            },
            None => Plan::Abort(Abort::CharacteristicNotFound),
        },
        (CharacteristicDiscovered, ProcedureCompleted(Ok(()))) => Plan::Run {
            steps: &[Step::EnableConnectionCte, Step::StartScan],
            next: Some(Running),
        },

        _ => Plan::Ignore,
    }
}

fn plan_connectionless(session: &TagSession, event: HandshakeEvent) -> Plan {
    match (session.state(), event) {
        (SessionState::Syncing, HandshakeEvent::SyncOpened) => Plan::Run {
            steps: &[Step::StopScan, Step::EnableConnectionlessCte, Step::StartScan],
            next: Some(SessionState::Running),
        },
        _ => Plan::Ignore,
    }
}
