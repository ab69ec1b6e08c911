use crate::*;

use bytes::Bytes;
use locator_engine::{run, LoopStats};
use locator_services::{JsonLinesSink, LiveSamples, SampleSource, VecSink};
use tokio::sync::mpsc;

/// Full connection flow over the channel, records written as JSON lines.
#[tokio::test]
async fn test_connection_stream_to_json_lines() {
    let factory = ScriptedFactory::always_good();
    let locator = booted(&config(BindingMode::Connection), factory).unwrap();
    let (tx, rx) = mpsc::channel(64);

    let producer = tokio::spawn(async move {
        let connection = 1;
        let mut events = vec![
            scan_report(tag(1), 0x00),
            TransportEvent::ConnectionOpened {
                connection,
                address: tag(1),
                address_type: AddressType::Public,
            },
            TransportEvent::GattService {
                connection,
                service: 0x20,
                uuid: Bytes::copy_from_slice(&CTE_SERVICE_UUID),
            },
            TransportEvent::ProcedureCompleted { connection, result: 0 },
            TransportEvent::GattCharacteristic {
                connection,
                characteristic: 0x25,
                uuid: Bytes::copy_from_slice(&CTE_ENABLE_CHAR_UUID),
            },
            TransportEvent::ProcedureCompleted { connection, result: 0 },
            TransportEvent::ProcedureCompleted { connection, result: 0 },
        ];
        for seq in 0..3 {
            events.push(TransportEvent::ConnectionIqReport {
                connection,
                report: report(seq),
            });
        }
        events.push(TransportEvent::ConnectionClosed { connection, reason: 0x08 });
        // Arrives after the close
        events.push(TransportEvent::ConnectionIqReport {
            connection,
            report: report(3),
        });
        for event in events {
            tx.send(event).await.map_err(|_| anyhow::anyhow!("loop gone"))?;
        }
        anyhow::Ok(())
    });

    let mut sink = JsonLinesSink::new(Vec::new());
    let (locator, stats) = run(locator, rx, &mut sink).await;
    producer.await.unwrap().unwrap();

    assert_eq!(
        stats,
        LoopStats {
            events: 12,
            published: 3,
            errors: 0,
        }
    );
    assert!(locator.registry().is_empty());

    let out = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2]["sequence"], 2);
    assert_eq!(lines[0]["tag_id"], "ble-pd-014314F45E3A");
    assert_eq!(lines[0]["locator_id"], "ble-pd-000000000001");
}

/// Per-tag errors are counted and the loop keeps going.
#[tokio::test]
async fn test_errors_do_not_stop_the_loop() {
    let mut cfg = config(BindingMode::Connection);
    cfg.tags.max_tags = 1;
    let locator = booted(&cfg, ScriptedFactory::always_good()).unwrap();
    let (tx, rx) = mpsc::channel(16);

    tx.send(scan_report(tag(1), 0x00)).await.unwrap();
    // Table full
    tx.send(scan_report(tag(2), 0x00)).await.unwrap();
    // GATT failure on the only session
    tx.send(TransportEvent::ConnectionOpened {
        connection: 1,
        address: tag(1),
        address_type: AddressType::Public,
    })
    .await
    .unwrap();
    tx.send(TransportEvent::ProcedureCompleted { connection: 1, result: 0x0105 })
        .await
        .unwrap();
    // Slot is free again
    tx.send(scan_report(tag(2), 0x00)).await.unwrap();
    drop(tx);

    let mut sink = VecSink::default();
    let (locator, stats) = run(locator, rx, &mut sink).await;

    assert_eq!(stats.events, 5);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.published, 0);
    assert!(locator.session(&tag(2), AddressType::Public).is_some());
    assert!(locator.session(&tag(1), AddressType::Public).is_none());
}

/// Replays one captured report in place of whatever the radio delivers.
struct Replay {
    captured: RawReport,
    inner: LiveSamples,
}

impl SampleSource for Replay {
    fn samples(&mut self, address: &BdAddr, live: RawReport) -> RawReport {
        let live = self.inner.samples(address, live);
        RawReport {
            sequence: live.sequence,
            ..self.captured.clone()
        }
    }
}

/// A substituted sample source feeds the pipeline; sequence numbers still
/// come from the live report.
#[tokio::test]
async fn test_replayed_samples() {
    let mut cfg = config(BindingMode::Silabs);
    cfg.admission.divider = 1;
    cfg.admission.cadence = 1;
    let factory = ScriptedFactory::always_good();
    let captured = RawReport::from_iq(20, -45, 0, &[5; 142]);
    let locator = booted(&cfg, factory.clone()).unwrap().with_sample_source(Box::new(Replay {
        captured,
        inner: LiveSamples,
    }));

    let (tx, rx) = mpsc::channel(8);
    for seq in [40, 41] {
        tx.send(TransportEvent::SilabsIqReport {
            address: tag(5),
            address_type: AddressType::Public,
            report: report(seq),
        })
        .await
        .unwrap();
    }
    drop(tx);

    let mut sink = VecSink::default();
    let (_, stats) = run(locator, rx, &mut sink).await;
    assert_eq!(stats.published, 2);

    let sequences: Vec<u16> = sink.records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![40, 41]);
    assert!(sink.records.iter().all(|r| r.channel == 20));

    let log = factory.log.lock().unwrap();
    let samples = log.last_samples.as_ref().unwrap();
    // Every byte was 5, scaled to [-1, 1]
    assert!((samples.reference_i[0] - 5.0 / 127.0).abs() < 1e-6);
}
