use crate::*;

use bytes::Bytes;
use locator_engine::LocatorError;
use locator_services::{SessionState, TagHandle};

/// Walk one tag through the GATT handshake. Returns its connection handle.
fn handshake(locator: &mut Locator<RecordingTransport>, address: BdAddr) -> anyhow::Result<u16> {
    dispatch(locator, scan_report(address, 0x00))?;
    let connection = locator
        .session(&address, AddressType::Public)
        .and_then(|s| match s.handle() {
            TagHandle::Connection(c) => Some(c),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("no session after discovery"))?;

    let events = [
        TransportEvent::ConnectionOpened {
            connection,
            address,
            address_type: AddressType::Public,
        },
        TransportEvent::GattService {
            connection,
            service: 0x0001_0020,
            uuid: Bytes::copy_from_slice(&CTE_SERVICE_UUID),
        },
        TransportEvent::ProcedureCompleted { connection, result: 0 },
        TransportEvent::GattCharacteristic {
            connection,
            characteristic: 0x0025,
            uuid: Bytes::copy_from_slice(&CTE_ENABLE_CHAR_UUID),
        },
        TransportEvent::ProcedureCompleted { connection, result: 0 },
        TransportEvent::ProcedureCompleted { connection, result: 0 },
    ];
    for event in events {
        dispatch(locator, event)?;
    }
    Ok(connection)
}

/// Discovery → four-step handshake → running → samples → result record.
#[test]
fn test_connection_handshake_to_result() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&config(BindingMode::Connection), factory.clone()).unwrap();

    let result = (|| -> anyhow::Result<()> {
        let connection = handshake(&mut locator, tag(1))?;
        let session = locator
            .session(&tag(1), AddressType::Public)
            .ok_or_else(|| anyhow::anyhow!("session missing"))?;
        assert_eq!(session.state(), SessionState::Running);

        assert_eq!(
            locator.transport().sent,
            vec![
                Sent::OpenConnection(tag(1)),
                Sent::DiscoverServices(connection),
                Sent::DiscoverCharacteristic(connection, 0x0001_0020),
                Sent::Write(connection, 0x0025, vec![0x01]),
                Sent::EnableConnectionCte(connection),
                Sent::StartScan(ScanMode::Generic),
            ]
        );

        let record = dispatch(
            &mut locator,
            TransportEvent::ConnectionIqReport {
                connection,
                report: report(77),
            },
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a record"))?;

        assert_eq!(record.tag_id, "ble-pd-014314F45E3A");
        assert_eq!(record.locator_id, "ble-pd-000000000001");
        assert_eq!(record.topic(), format!("silabs/aoa/angle/ble-pd-000000000001/{}", record.tag_id));
        assert_eq!(record.azimuth, 30.0);
        assert_eq!(record.sequence, 77);
        assert_eq!(record.channel, 12);
        // RSSI equals the reference power: one metre
        assert!((record.distance - 1.0).abs() < 1e-4);

        let json: serde_json::Value = serde_json::from_str(&record.to_json()?)?;
        assert_eq!(json["sequence"], 77);

        let log = factory.log.lock().unwrap();
        assert_eq!(log.calls, 1);
        // Logical channel 12 is physical 14
        assert_eq!(log.last_frequency, Some(2_430_000_000.0));
        Ok(())
    })();

    result.unwrap();
}

/// Handshake events that arrive out of order never move the session.
#[test]
fn test_out_of_order_events_do_not_skip_steps() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&config(BindingMode::Connection), factory).unwrap();

    dispatch(&mut locator, scan_report(tag(1), 0x00)).unwrap();
    let connection = 1;

    // Completion before the link is up, characteristic before service
    dispatch(&mut locator, TransportEvent::ProcedureCompleted { connection, result: 0 }).unwrap();
    dispatch(
        &mut locator,
        TransportEvent::GattCharacteristic {
            connection,
            characteristic: 9,
            uuid: Bytes::copy_from_slice(&CTE_ENABLE_CHAR_UUID),
        },
    )
    .unwrap();

    let session = locator.session(&tag(1), AddressType::Public).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(session.characteristic_ref, None);

    // Samples before running are dropped
    let out = dispatch(
        &mut locator,
        TransportEvent::ConnectionIqReport {
            connection,
            report: report(1),
        },
    )
    .unwrap();
    assert!(out.is_none());
    assert_eq!(locator.transport().sent, vec![Sent::OpenConnection(tag(1))]);
}

/// A rejected handshake command closes the session; rediscovery starts fresh.
#[test]
fn test_command_failure_is_session_fatal() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&config(BindingMode::Connection), factory.clone()).unwrap();

    dispatch(&mut locator, scan_report(tag(1), 0x00)).unwrap();
    locator
        .transport_mut()
        .reject
        .push(("discover_services", 0x0181));

    let err = dispatch(
        &mut locator,
        TransportEvent::ConnectionOpened {
            connection: 1,
            address: tag(1),
            address_type: AddressType::Public,
        },
    )
    .unwrap_err();
    assert!(matches!(err, LocatorError::HandshakeFailed { .. }));
    assert!(locator.registry().is_empty());
    assert!(locator.transport().sent.contains(&Sent::CloseConnection(1)));
    assert_eq!(factory.log.lock().unwrap().released, 1);

    // The close event that follows is an unknown handle now
    dispatch(&mut locator, TransportEvent::ConnectionClosed { connection: 1, reason: 0x16 }).unwrap();

    locator.transport_mut().reject.clear();
    dispatch(&mut locator, scan_report(tag(1), 0x00)).unwrap();
    let session = locator.session(&tag(1), AddressType::Public).unwrap();
    assert_eq!(session.handle(), TagHandle::Connection(2));
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(factory.log.lock().unwrap().created, 2);
}

/// Disconnect removes the session and re-arms scanning; the same address
/// then gets a new session rather than the stale one.
#[test]
fn test_disconnect_then_rediscover() {
    let factory = ScriptedFactory::new(vec![good(5.0), good(6.0)]);
    let mut locator = booted(&config(BindingMode::Connection), factory.clone()).unwrap();

    let first = handshake(&mut locator, tag(1)).unwrap();
    dispatch(
        &mut locator,
        TransportEvent::ConnectionIqReport {
            connection: first,
            report: report(1),
        },
    )
    .unwrap();
    assert!(locator.session(&tag(1), AddressType::Public).unwrap().last_result.is_some());

    locator.transport_mut().sent.clear();
    dispatch(&mut locator, TransportEvent::ConnectionClosed { connection: first, reason: 0x08 }).unwrap();
    assert!(locator.session(&tag(1), AddressType::Public).is_none());
    assert!(locator.registry().find_by_handle(TagHandle::Connection(first)).is_none());
    assert_eq!(locator.transport().sent, vec![Sent::StartScan(ScanMode::Generic)]);

    let second = handshake(&mut locator, tag(1)).unwrap();
    assert_ne!(first, second);
    let session = locator.session(&tag(1), AddressType::Public).unwrap();
    assert!(session.last_result.is_none());
    assert_eq!(factory.log.lock().unwrap().released, 1);

    // Late report on the old handle
    let out = dispatch(
        &mut locator,
        TransportEvent::ConnectionIqReport {
            connection: first,
            report: report(2),
        },
    )
    .unwrap();
    assert!(out.is_none());
}

/// Non-connectable advertisements and advertisements without the CTE
/// service never start a handshake.
#[test]
fn test_discovery_gating() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&config(BindingMode::Connection), factory).unwrap();

    dispatch(&mut locator, scan_report(tag(1), 0x04)).unwrap();
    dispatch(
        &mut locator,
        TransportEvent::ScanReport {
            address: tag(2),
            address_type: AddressType::Public,
            packet_type: 0x00,
            adv_sid: 0,
            data: Bytes::from_static(&[0x02, 0x01, 0x06]),
        },
    )
    .unwrap();

    assert!(locator.registry().is_empty());
    assert!(locator.transport().sent.is_empty());
}

/// Scanner already running is not a failure when the session goes live.
#[test]
fn test_invalid_state_on_rearm_is_tolerated() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&config(BindingMode::Connection), factory).unwrap();
    locator.transport_mut().reject.push(("start_scan", 0x0002));

    handshake(&mut locator, tag(1)).unwrap();
    assert!(locator.session(&tag(1), AddressType::Public).unwrap().is_running());
}
