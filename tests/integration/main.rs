//! Locator integration test harness.
//!
//! Scenarios drive a full `Locator` through the binding adapters with a
//! transport that records every command and an estimator whose outcomes
//! are scripted per session. No radio is involved.
//!
//!   cargo test --test integration
//!
//! Set RUST_LOG=debug to see the locator's own logging.

use std::sync::Arc;

use bytes::Bytes;

use locator_core::config::LocatorConfig;
use locator_core::{AddressType, BdAddr, BindingMode, RawReport};
use locator_engine::adv::{CTE_ENABLE_CHAR_UUID, CTE_SERVICE_UUID};
use locator_engine::{dispatch, Locator, ScanMode, TransportEvent};
use locator_services::estimator::EstimateError;

pub use locator_engine::testing::{good, RecordingTransport, ScriptedFactory, Sent};

mod connection;
mod event_stream;
mod silabs;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Install a subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Tag address with a distinguishing last octet (printed first).
pub fn tag(n: u8) -> BdAddr {
    BdAddr([0x3A, 0x5E, 0xF4, 0x14, 0x43, n])
}

pub const LOCATOR_ADDR: BdAddr = BdAddr([0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);

pub fn config(mode: BindingMode) -> LocatorConfig {
    let mut config = LocatorConfig::default();
    config.binding.mode = mode;
    config
}

pub fn booted(
    config: &LocatorConfig,
    factory: Arc<ScriptedFactory>,
) -> anyhow::Result<Locator<RecordingTransport>> {
    init_tracing();
    tracing::debug!(mode = ?config.binding.mode, max_tags = config.tags.max_tags, "scenario locator");
    let mut locator = Locator::new(config, RecordingTransport::default(), factory)?;
    dispatch(
        &mut locator,
        TransportEvent::Boot {
            address: LOCATOR_ADDR,
            address_type: AddressType::Public,
        },
    )?;
    locator.transport_mut().sent.clear();
    Ok(locator)
}

/// Advertising data listing the CTE service after a flags structure.
pub fn cte_advertisement() -> Bytes {
    let mut data = vec![0x02, 0x01, 0x06, 0x11, 0x07];
    data.extend_from_slice(&CTE_SERVICE_UUID);
    Bytes::from(data)
}

pub fn scan_report(address: BdAddr, packet_type: u8) -> TransportEvent {
    TransportEvent::ScanReport {
        address,
        address_type: AddressType::Public,
        packet_type,
        adv_sid: 1,
        data: cte_advertisement(),
    }
}

/// A well-formed report for the default 4x4 array.
pub fn report(sequence: u16) -> RawReport {
    let iq: Vec<i8> = (0..142).map(|n| ((n * 7) % 200 - 100) as i8).collect();
    RawReport::from_iq(12, -45, sequence, &iq)
}
