use crate::*;

use locator_core::AdmissionScope;
use locator_services::{SessionState, TagHandle};

fn silabs_report(address: BdAddr, sequence: u16) -> TransportEvent {
    TransportEvent::SilabsIqReport {
        address,
        address_type: AddressType::Public,
        report: report(sequence),
    }
}

fn silabs_config(divider: u32, cadence: u32, scope: AdmissionScope) -> LocatorConfig {
    let mut cfg = config(BindingMode::Silabs);
    cfg.admission.divider = divider;
    cfg.admission.cadence = cadence;
    cfg.admission.scope = scope;
    cfg
}

/// Boot enables the vendor CTE once and observes.
#[test]
fn test_boot_enables_vendor_cte() {
    init_tracing();
    let cfg = config(BindingMode::Silabs);
    let mut locator =
        Locator::new(&cfg, RecordingTransport::default(), ScriptedFactory::always_good()).unwrap();
    dispatch(
        &mut locator,
        TransportEvent::Boot {
            address: LOCATOR_ADDR,
            address_type: AddressType::Random,
        },
    )
    .unwrap();

    assert_eq!(locator.locator_id(), "ble-sr-000000000001");
    assert_eq!(
        locator.transport().sent,
        vec![Sent::EnableSilabsCte, Sent::StartScan(ScanMode::Observation)]
    );
}

/// First report creates a running, address-keyed session; decimation
/// admits positions 3, 6 and 9 out of nine.
#[test]
fn test_first_report_runs_and_decimates() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&silabs_config(3, 3, AdmissionScope::PerTag), factory.clone()).unwrap();

    let mut admitted = Vec::new();
    for seq in 1..=9u16 {
        if let Some(record) = dispatch(&mut locator, silabs_report(tag(7), seq)).unwrap() {
            admitted.push(record.sequence);
        }
    }
    assert_eq!(admitted, vec![3, 6, 9]);
    assert_eq!(factory.log.lock().unwrap().calls, 3);
    assert_eq!(locator.admission().dropped(), 6);

    let session = locator.session(&tag(7), AddressType::Public).unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.handle(), TagHandle::None);
    assert_eq!(session.last_result.map(|r| r.sequence), Some(9));

    // No handshake traffic at all
    assert!(locator.transport().sent.is_empty());
}

/// Per-tag counters do not interfere; a global counter is shared.
#[test]
fn test_admission_scope() {
    let factory = ScriptedFactory::always_good();
    let mut per_tag = booted(&silabs_config(2, 3, AdmissionScope::PerTag), factory.clone()).unwrap();
    let mut global = booted(&silabs_config(2, 3, AdmissionScope::Global), factory).unwrap();
    assert_eq!(per_tag.admission().scope(), AdmissionScope::PerTag);
    assert_eq!(global.admission().scope(), AdmissionScope::Global);

    let mut per_tag_out = 0;
    let mut global_out = 0;
    for seq in 0..4u16 {
        for t in [tag(1), tag(2)] {
            if dispatch(&mut per_tag, silabs_report(t, seq)).unwrap().is_some() {
                per_tag_out += 1;
            }
            if dispatch(&mut global, silabs_report(t, seq)).unwrap().is_some() {
                global_out += 1;
            }
        }
    }
    // Per tag: report 2 of each tag's four. Shared: reports 2, 5 and 8.
    assert_eq!(per_tag_out, 2);
    assert_eq!(global_out, 3);
    assert!(per_tag
        .session(&tag(1), AddressType::Public)
        .unwrap()
        .decimator
        .is_some());
    assert!(global
        .session(&tag(1), AddressType::Public)
        .unwrap()
        .decimator
        .is_none());
}

/// Estimator needs ten rounds: no result through call nine, then one.
#[test]
fn test_in_progress_until_tenth_call() {
    let mut script = vec![Err(EstimateError::InProgress); 9];
    script.push(good(-20.0));
    let factory = ScriptedFactory::new(script);
    let mut locator = booted(&silabs_config(1, 1, AdmissionScope::PerTag), factory).unwrap();

    for seq in 1..=9u16 {
        let out = dispatch(&mut locator, silabs_report(tag(3), seq)).unwrap();
        assert!(out.is_none());
        assert!(locator
            .session(&tag(3), AddressType::Public)
            .unwrap()
            .last_result
            .is_none());
    }
    let record = dispatch(&mut locator, silabs_report(tag(3), 10)).unwrap().unwrap();
    assert_eq!(record.azimuth, -20.0);
    assert_eq!(
        locator
            .session(&tag(3), AddressType::Public)
            .unwrap()
            .last_result
            .map(|r| r.sequence),
        Some(10)
    );
}

/// Allow-listed tags only; runtime additions take effect immediately.
#[test]
fn test_allowlist_gates_reports() {
    let mut cfg = silabs_config(1, 1, AdmissionScope::PerTag);
    cfg.tags.allowlist = vec![tag(1).to_string()];
    let mut locator = booted(&cfg, ScriptedFactory::always_good()).unwrap();

    for seq in 0..20u16 {
        assert!(dispatch(&mut locator, silabs_report(tag(2), seq)).unwrap().is_none());
    }
    assert!(locator.registry().is_empty());
    assert_eq!(locator.allowlist().rejected(), 20);

    assert!(dispatch(&mut locator, silabs_report(tag(1), 0)).unwrap().is_some());

    locator.allowlist().add(tag(2));
    assert!(dispatch(&mut locator, silabs_report(tag(2), 21)).unwrap().is_some());
    assert_eq!(locator.registry().len(), 2);
}

/// Address-keyed sessions can be dropped explicitly.
#[test]
fn test_forget_tag() {
    let factory = ScriptedFactory::always_good();
    let mut locator = booted(&silabs_config(1, 1, AdmissionScope::PerTag), factory.clone()).unwrap();
    dispatch(&mut locator, silabs_report(tag(1), 0)).unwrap();

    assert!(locator.forget_tag(&tag(1), AddressType::Public));
    assert!(!locator.forget_tag(&tag(1), AddressType::Public));
    assert_eq!(factory.log.lock().unwrap().released, 1);
}
