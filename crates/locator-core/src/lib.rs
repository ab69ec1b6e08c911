//! Shared types for the AoA locator: device addresses,
//! antenna array geometry, raw IQ reports, result records and configuration.
//! All other locator crates depend on this one.

pub mod address;
pub mod config;
pub mod geometry;
pub mod report;

pub use address::{device_id, AddressType, BdAddr};
pub use config::{AdmissionScope, BindingMode, ConfigError, LocatorConfig};
pub use geometry::{ArrayGeometry, ArrayType};
pub use report::{AngleResult, RawReport, ResultRecord};
