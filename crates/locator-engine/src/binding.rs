//! Binding adapters: map the transport's event vocabulary onto locator
//! operations.
//!
//! Each binding reacts to its own subset of events; anything else is
//! dropped. The connection binding only considers connectable legacy
//! advertisements, the connectionless binding only extended ones.

use locator_core::{BindingMode, ResultRecord};
use locator_services::TagHandle;

use crate::adv::{
    find_service_in_advertisement, is_connectable, is_extended, CTE_ENABLE_CHAR_UUID,
    CTE_SERVICE_UUID,
};
use crate::handshake::HandshakeEvent;
use crate::locator::{Locator, LocatorError, ReportSource};
use crate::transport::{TransportCommands, TransportEvent};

/// Feed one transport event to the locator.
pub fn dispatch<T: TransportCommands>(
    locator: &mut Locator<T>,
    event: TransportEvent,
) -> Result<Option<ResultRecord>, LocatorError> {
    let mode = locator.mode();
    match (mode, event) {
        (_, TransportEvent::Boot { address, address_type }) => {
            locator.on_boot(address, address_type)?;
        }

        (
            BindingMode::Connection | BindingMode::Connectionless,
            TransportEvent::ScanReport {
                address,
                address_type,
                packet_type,
                adv_sid,
                data,
            },
        ) => {
            let eligible = match mode {
                BindingMode::Connection => is_connectable(packet_type),
                _ => is_extended(packet_type),
            };
            if eligible {
                let service_present = find_service_in_advertisement(&data, &CTE_SERVICE_UUID);
                locator.on_discovery(address, address_type, service_present, adv_sid)?;
            }
        }

        // Connection binding
        (BindingMode::Connection, TransportEvent::ConnectionOpened { connection, .. }) => {
            locator.on_handshake_event(TagHandle::Connection(connection), HandshakeEvent::LinkOpened)?;
        }
        (BindingMode::Connection, TransportEvent::GattService { connection, service, uuid }) => {
            if uuid[..] == CTE_SERVICE_UUID[..] {
                locator.on_handshake_event(
                    TagHandle::Connection(connection),
                    HandshakeEvent::ServiceFound(service),
                )?;
            }
        }
        (
            BindingMode::Connection,
            TransportEvent::GattCharacteristic {
                connection,
                characteristic,
                uuid,
            },
        ) => {
            if uuid[..] == CTE_ENABLE_CHAR_UUID[..] {
                locator.on_handshake_event(
                    TagHandle::Connection(connection),
                    HandshakeEvent::CharacteristicFound(characteristic),
                )?;
            }
        }
        (BindingMode::Connection, TransportEvent::ProcedureCompleted { connection, result }) => {
            let outcome = if result == 0 { Ok(()) } else { Err(result) };
            locator.on_handshake_event(
                TagHandle::Connection(connection),
                HandshakeEvent::ProcedureCompleted(outcome),
            )?;
        }
        (BindingMode::Connection, TransportEvent::ConnectionClosed { connection, reason }) => {
            tracing::debug!(connection, reason, "connection closed");
            locator.on_session_closed(TagHandle::Connection(connection));
        }
        (BindingMode::Connection, TransportEvent::ConnectionIqReport { connection, report }) => {
            return locator.on_sample_report(
                ReportSource::Handle(TagHandle::Connection(connection)),
                report,
            );
        }

        // Connectionless binding
        (BindingMode::Connectionless, TransportEvent::SyncOpened { sync }) => {
            locator.on_handshake_event(TagHandle::Sync(sync), HandshakeEvent::SyncOpened)?;
        }
        (BindingMode::Connectionless, TransportEvent::SyncClosed { sync }) => {
            locator.on_session_closed(TagHandle::Sync(sync));
        }
        (BindingMode::Connectionless, TransportEvent::ConnectionlessIqReport { sync, report }) => {
            return locator.on_sample_report(ReportSource::Handle(TagHandle::Sync(sync)), report);
        }

        // Proprietary broadcast binding
        (
            BindingMode::Silabs,
            TransportEvent::SilabsIqReport {
                address,
                address_type,
                report,
            },
        ) => {
            return locator.on_sample_report(ReportSource::Address(address, address_type), report);
        }

        (mode, other) => {
            tracing::trace!(?mode, event = other.kind(), "event not handled by binding");
        }
    }
    Ok(None)
}
