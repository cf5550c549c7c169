//! Axis Core - Shared types for the Axis camera provisioning workflow
//!
//! This crate provides:
//! - The declarative resource description and its one-time validation
//! - Device identity, serial number validation, and credentials
//! - The workflow state document and its storage backends
//! - Error kinds shared by every step
//! - Firmware pin comparison

pub mod error;
pub mod firmware;
pub mod identity;
pub mod report;
pub mod resource;
pub mod state;

pub use error::{ErrorKind, ProvisionError, Result};
pub use firmware::{compare_firmware, FirmwarePin, FirmwareStatus};
pub use identity::{
    is_valid_serial_number, normalize_mac, validate_serial_number, Credentials, DeviceIdentity,
    Subnet,
};
pub use report::StatusReport;
pub use resource::{
    Locator, NetworkIntent, NetworkMode, Orientation, ProvisionStrategy, Resource,
    ZipstreamStrength,
};
pub use state::{record_failure, FileStateStore, MemoryStateStore, StateStore, WorkflowState};
