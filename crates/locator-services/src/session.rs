//! Tag sessions, one per tracked device.

use serde::{Deserialize, Serialize};

use locator_core::{device_id, AddressType, AngleResult, BdAddr};

use crate::admission::Decimator;
use crate::estimator::EstimatorContext;

/// Transport identifier of a session. The kind depends on the binding:
/// a connection handle, a periodic-sync handle, or nothing at all when the
/// tag is only ever known by its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagHandle {
    None,
    Connection(u16),
    Sync(u16),
}

impl TagHandle {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Display for TagHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Connection(h) => write!(f, "conn:{h}"),
            Self::Sync(h) => write!(f, "sync:{h}"),
        }
    }
}

/// Handshake state of a session.
///
/// Connection binding:
///   Discovered → Connecting → ServicesDiscovered → CharacteristicDiscovered → Running
/// Connectionless binding:
///   Discovered → Syncing → Running
/// Proprietary broadcast binding:
///   Discovered → Running, in the same step that creates the session.
///
/// Any state except Closed may drop to Closed; nothing leaves Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Discovered,
    Connecting,
    Syncing,
    ServicesDiscovered,
    CharacteristicDiscovered,
    Running,
    Closed,
}

impl SessionState {
    /// The one state that may follow `self` for a session owning `handle`.
    /// The handle kind selects the binding's transition graph.
    pub fn successor(self, handle: TagHandle) -> Option<SessionState> {
        use SessionState::*;
        match (self, handle) {
            (Discovered, TagHandle::Connection(_)) => Some(Connecting),
            (Connecting, TagHandle::Connection(_)) => Some(ServicesDiscovered),
            (ServicesDiscovered, TagHandle::Connection(_)) => Some(CharacteristicDiscovered),
            (CharacteristicDiscovered, TagHandle::Connection(_)) => Some(Running),
            (Discovered, TagHandle::Sync(_)) => Some(Syncing),
            (Syncing, TagHandle::Sync(_)) => Some(Running),
            (Discovered, TagHandle::None) => Some(Running),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::ServicesDiscovered => "services_discovered",
            Self::CharacteristicDiscovered => "characteristic_discovered",
            Self::Running => "running",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// State of one tracked tag. Owned by the [`TagRegistry`](crate::TagRegistry).
pub struct TagSession {
    address: BdAddr,
    address_type: AddressType,
    handle: TagHandle,
    tag_id: String,
    state: SessionState,
    /// Remote service carrying the CTE enable characteristic (connection binding).
    pub service_ref: Option<u32>,
    /// The CTE enable characteristic (connection binding).
    pub characteristic_ref: Option<u16>,
    /// Set once the transport reports the link open (connection binding).
    pub link_up: bool,
    pub estimator: EstimatorContext,
    pub last_result: Option<AngleResult>,
    /// Per-tag admission counter, when admission is scoped per tag.
    pub decimator: Option<Decimator>,
}

impl TagSession {
    pub(crate) fn new(
        address: BdAddr,
        address_type: AddressType,
        handle: TagHandle,
        estimator: EstimatorContext,
    ) -> Self {
        Self {
            address,
            address_type,
            handle,
            tag_id: device_id(&address, address_type),
            state: SessionState::Discovered,
            service_ref: None,
            characteristic_ref: None,
            link_up: false,
            estimator,
            last_result: None,
            decimator: None,
        }
    }

    pub fn address(&self) -> BdAddr {
        self.address
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// Assigned at creation, never changes.
    pub fn handle(&self) -> TagHandle {
        self.handle
    }

    /// Published id, e.g. `ble-pd-0C4314F45E3A`.
    pub fn tag_id(&self) -> &str {
        &self.tag_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` if it is the successor of the current state in this
    /// session's binding, or `Closed`. Returns false and leaves the state
    /// alone otherwise.
    pub fn advance(&mut self, next: SessionState) -> bool {
        let allowed = match next {
            SessionState::Closed => self.state != SessionState::Closed,
            _ => self.state.successor(self.handle) == Some(next),
        };
        if !allowed {
            tracing::debug!(tag = %self.tag_id, from = %self.state, to = %next, "state change refused");
            return false;
        }
        tracing::debug!(tag = %self.tag_id, from = %self.state, to = %next, "session state");
        self.state = next;
        true
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }
}

impl std::fmt::Debug for TagSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSession")
            .field("tag_id", &self.tag_id)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("service_ref", &self.service_ref)
            .field("characteristic_ref", &self.characteristic_ref)
            .field("last_result", &self.last_result)
            .finish_non_exhaustive()
    }
}
