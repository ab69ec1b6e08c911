//! Transport seam: the command sink the locator drives and the events it
//! consumes.
//!
//! The radio stack itself (serial/TCP NCP link, scanner timing, GATT
//! client) lives behind [`TransportCommands`]. Every command returns a
//! status; anything other than success surfaces as a [`CommandError`].

use bytes::Bytes;

use locator_core::config::LocatorConfig;
use locator_core::{AddressType, BdAddr, RawReport};

/// Status returned when a command does not apply in the current radio
/// state, e.g. starting a scanner that already runs.
pub const STATUS_INVALID_STATE: u16 = 0x0002;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{command} rejected with status 0x{status:04x}")]
    Rejected { command: &'static str, status: u16 },
}

impl CommandError {
    pub fn rejected(command: &'static str, status: u16) -> Self {
        Self::Rejected { command, status }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Rejected { status, .. } => *status,
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        self.status() == STATUS_INVALID_STATE
    }
}

/// Scanner discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// General discovery; used when the locator connects to tags.
    Generic,
    /// Observe everything, connect to nothing.
    Observation,
}

/// CTE reception parameters handed to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteParameters {
    pub sampling_interval: u8,
    pub min_length: u8,
    pub count: u8,
    pub slot_duration: u8,
    /// Antenna switching pattern for the configured array.
    pub switching_pattern: Vec<u8>,
}

impl CteParameters {
    pub fn from_config(config: &LocatorConfig) -> Self {
        Self {
            sampling_interval: config.cte.sampling_interval,
            min_length: config.cte.min_length,
            count: config.cte.count,
            slot_duration: config.cte.slot_duration,
            switching_pattern: config.array.array_type.switching_pattern().to_vec(),
        }
    }
}

/// Commands the locator issues to the radio stack.
pub trait TransportCommands: Send {
    /// Open a link. Returns the connection handle.
    fn open_connection(&mut self, address: BdAddr, address_type: AddressType) -> Result<u16, CommandError>;

    fn discover_services(&mut self, connection: u16, uuid: &[u8; 16]) -> Result<(), CommandError>;

    fn discover_characteristic(
        &mut self,
        connection: u16,
        service: u32,
        uuid: &[u8; 16],
    ) -> Result<(), CommandError>;

    fn write_characteristic(
        &mut self,
        connection: u16,
        characteristic: u16,
        value: &[u8],
    ) -> Result<(), CommandError>;

    fn enable_connection_cte(&mut self, connection: u16, params: &CteParameters) -> Result<(), CommandError>;

    /// Synchronize to a periodic advertising train. Returns the sync handle.
    fn open_sync(
        &mut self,
        address: BdAddr,
        address_type: AddressType,
        adv_sid: u8,
    ) -> Result<u16, CommandError>;

    fn enable_connectionless_cte(&mut self, sync: u16, params: &CteParameters) -> Result<(), CommandError>;

    /// Enable reception of the vendor CTE on legacy advertisements.
    fn enable_silabs_cte(&mut self, params: &CteParameters) -> Result<(), CommandError>;

    fn start_scan(&mut self, mode: ScanMode) -> Result<(), CommandError>;

    fn stop_scan(&mut self) -> Result<(), CommandError>;

    fn close_connection(&mut self, connection: u16) -> Result<(), CommandError>;

    fn close_sync(&mut self, sync: u16) -> Result<(), CommandError>;
}

/// Events delivered by the radio stack, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Stack is up; `address` is the locator's own identity address.
    Boot {
        address: BdAddr,
        address_type: AddressType,
    },
    ScanReport {
        address: BdAddr,
        address_type: AddressType,
        packet_type: u8,
        adv_sid: u8,
        data: Bytes,
    },
    ConnectionOpened {
        connection: u16,
        address: BdAddr,
        address_type: AddressType,
    },
    GattService {
        connection: u16,
        service: u32,
        uuid: Bytes,
    },
    GattCharacteristic {
        connection: u16,
        characteristic: u16,
        uuid: Bytes,
    },
    /// A GATT procedure finished; `result` 0 means success.
    ProcedureCompleted {
        connection: u16,
        result: u16,
    },
    ConnectionClosed {
        connection: u16,
        reason: u16,
    },
    SyncOpened {
        sync: u16,
    },
    SyncClosed {
        sync: u16,
    },
    ConnectionIqReport {
        connection: u16,
        report: RawReport,
    },
    ConnectionlessIqReport {
        sync: u16,
        report: RawReport,
    },
    SilabsIqReport {
        address: BdAddr,
        address_type: AddressType,
        report: RawReport,
    },
}

impl TransportEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Boot { .. } => "boot",
            Self::ScanReport { .. } => "scan_report",
            Self::ConnectionOpened { .. } => "connection_opened",
            Self::GattService { .. } => "gatt_service",
            Self::GattCharacteristic { .. } => "gatt_characteristic",
            Self::ProcedureCompleted { .. } => "procedure_completed",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::SyncOpened { .. } => "sync_opened",
            Self::SyncClosed { .. } => "sync_closed",
            Self::ConnectionIqReport { .. } => "connection_iq_report",
            Self::ConnectionlessIqReport { .. } => "connectionless_iq_report",
            Self::SilabsIqReport { .. } => "silabs_iq_report",
        }
    }
}
