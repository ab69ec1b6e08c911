//! Test doubles shared by this crate's unit tests and the integration
//! scenarios (through the `testing` feature): a transport that records every
//! command and an estimator factory that replays a script.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use locator_core::{AddressType, BdAddr};
use locator_services::estimator::{
    AngleEstimator, DistanceFilter, Estimate, EstimateError, EstimatorContext, EstimatorError,
    EstimatorFactory, EstimatorSettings, IqSamples, LogDistanceFilter,
};

use crate::adv::{CTE_ENABLE_CHAR_UUID, CTE_SERVICE_UUID};
use crate::transport::{CommandError, CteParameters, ScanMode, TransportCommands};

/// A command seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    OpenConnection(BdAddr),
    DiscoverServices(u16),
    DiscoverCharacteristic(u16, u32),
    Write(u16, u16, Vec<u8>),
    EnableConnectionCte(u16),
    OpenSync(BdAddr, u8),
    /// Sync handle and the antenna switching pattern sent with it.
    EnableConnectionlessCte(u16, Vec<u8>),
    EnableSilabsCte,
    StartScan(ScanMode),
    StopScan,
    CloseConnection(u16),
    CloseSync(u16),
}

/// Records commands and hands out sequential handles starting at 1.
/// Commands named in `reject` fail with the paired status.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<Sent>,
    pub reject: Vec<(&'static str, u16)>,
    next_handle: u16,
}

impl RecordingTransport {
    fn check(&self, command: &'static str) -> Result<(), CommandError> {
        match self.reject.iter().find(|(c, _)| *c == command) {
            Some(&(_, status)) => Err(CommandError::rejected(command, status)),
            None => Ok(()),
        }
    }

    fn allocate(&mut self) -> u16 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn count(&self, pred: impl Fn(&Sent) -> bool) -> usize {
        self.sent.iter().filter(|c| pred(c)).count()
    }
}

impl TransportCommands for RecordingTransport {
    fn open_connection(&mut self, address: BdAddr, _: AddressType) -> Result<u16, CommandError> {
        self.check("open_connection")?;
        self.sent.push(Sent::OpenConnection(address));
        Ok(self.allocate())
    }

    fn discover_services(&mut self, connection: u16, uuid: &[u8; 16]) -> Result<(), CommandError> {
        assert_eq!(uuid, &CTE_SERVICE_UUID);
        self.check("discover_services")?;
        self.sent.push(Sent::DiscoverServices(connection));
        Ok(())
    }

    fn discover_characteristic(
        &mut self,
        connection: u16,
        service: u32,
        uuid: &[u8; 16],
    ) -> Result<(), CommandError> {
        assert_eq!(uuid, &CTE_ENABLE_CHAR_UUID);
        self.check("discover_characteristic")?;
        self.sent.push(Sent::DiscoverCharacteristic(connection, service));
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        connection: u16,
        characteristic: u16,
        value: &[u8],
    ) -> Result<(), CommandError> {
        self.check("write_characteristic")?;
        self.sent.push(Sent::Write(connection, characteristic, value.to_vec()));
        Ok(())
    }

    fn enable_connection_cte(&mut self, connection: u16, _: &CteParameters) -> Result<(), CommandError> {
        self.check("enable_connection_cte")?;
        self.sent.push(Sent::EnableConnectionCte(connection));
        Ok(())
    }

    fn open_sync(&mut self, address: BdAddr, _: AddressType, adv_sid: u8) -> Result<u16, CommandError> {
        self.check("open_sync")?;
        self.sent.push(Sent::OpenSync(address, adv_sid));
        Ok(self.allocate())
    }

    fn enable_connectionless_cte(&mut self, sync: u16, params: &CteParameters) -> Result<(), CommandError> {
        self.check("enable_connectionless_cte")?;
        self.sent
            .push(Sent::EnableConnectionlessCte(sync, params.switching_pattern.clone()));
        Ok(())
    }

    fn enable_silabs_cte(&mut self, _: &CteParameters) -> Result<(), CommandError> {
        self.check("enable_silabs_cte")?;
        self.sent.push(Sent::EnableSilabsCte);
        Ok(())
    }

    fn start_scan(&mut self, mode: ScanMode) -> Result<(), CommandError> {
        self.check("start_scan")?;
        self.sent.push(Sent::StartScan(mode));
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), CommandError> {
        self.check("stop_scan")?;
        self.sent.push(Sent::StopScan);
        Ok(())
    }

    fn close_connection(&mut self, connection: u16) -> Result<(), CommandError> {
        self.sent.push(Sent::CloseConnection(connection));
        Ok(())
    }

    fn close_sync(&mut self, sync: u16) -> Result<(), CommandError> {
        self.sent.push(Sent::CloseSync(sync));
        Ok(())
    }
}

// ── Estimators ────────────────────────────────────────────────────────────────

/// Shared view of what the scripted estimators did.
#[derive(Debug, Default)]
pub struct EstimatorLog {
    pub created: usize,
    pub released: usize,
    pub calls: usize,
    pub last_frequency: Option<f64>,
    pub last_samples: Option<IqSamples>,
}

/// Replays `script` for every context it creates; the last entry repeats.
pub struct ScriptedFactory {
    script: Vec<Result<Estimate, EstimateError>>,
    pub log: Arc<Mutex<EstimatorLog>>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<Result<Estimate, EstimateError>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            log: Arc::new(Mutex::new(EstimatorLog::default())),
        })
    }

    pub fn always(outcome: Result<Estimate, EstimateError>) -> Arc<Self> {
        Self::new(vec![outcome])
    }

    pub fn always_good() -> Arc<Self> {
        Self::always(good(30.0))
    }
}

struct ScriptedEstimator {
    script: VecDeque<Result<Estimate, EstimateError>>,
    log: Arc<Mutex<EstimatorLog>>,
}

impl AngleEstimator for ScriptedEstimator {
    fn estimate(&mut self, samples: &IqSamples, frequency: f64) -> Result<Estimate, EstimateError> {
        let mut log = self.log.lock().unwrap();
        log.calls += 1;
        log.last_frequency = Some(frequency);
        log.last_samples = Some(samples.clone());
        if self.script.len() > 1 {
            self.script.pop_front().unwrap()
        } else {
            self.script
                .front()
                .cloned()
                .unwrap_or(Err(EstimateError::InProgress))
        }
    }

    fn deinit(&mut self) -> Result<(), EstimatorError> {
        self.log.lock().unwrap().released += 1;
        Ok(())
    }
}

impl EstimatorFactory for ScriptedFactory {
    fn create(&self, settings: &EstimatorSettings) -> Result<EstimatorContext, EstimatorError> {
        self.log.lock().unwrap().created += 1;
        let distance: Box<dyn DistanceFilter> = Box::new(LogDistanceFilter::new(settings.filtering_amount));
        Ok(EstimatorContext::new(
            Box::new(ScriptedEstimator {
                script: self.script.iter().cloned().collect(),
                log: self.log.clone(),
            }),
            distance,
        ))
    }
}

pub fn good(azimuth: f32) -> Result<Estimate, EstimateError> {
    Ok(Estimate {
        azimuth,
        elevation: 15.0,
        quality: 0,
    })
}
