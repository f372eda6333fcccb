//! HID over I2C transport
//!
//! This crate speaks the HID over I2C protocol to a device sitting behind any
//! bus that can do a combined write-then-read transaction:
//!
//! - firmware identity resolution (bus address, interrupt, descriptor register)
//! - the command engine (HID descriptor, report descriptor, input reports, GET_REPORT)
//! - report descriptor parsing
//! - report delivery, interrupt driven or polled, with a runtime sampling rate
//!
//! ```text
//! [acpi]  ──► HardwareIdentity
//!                   │
//! [I2cBus] ◄── [CommandEngine] ◄── [Delivery actor + worker] ──► ReportHandler
//! ```

pub mod acpi;
pub mod command;
pub mod delivery;
pub mod error;
pub mod protocol;
pub mod rdesc;
pub mod sim;
pub mod types;

pub use acpi::{enumerate_unclaimed, lookup, resolve_identity, FirmwareNode, StaticNode};
pub use command::{hex_dump, CommandEngine, FetchedReportDescriptor, SharedEngine};
pub use delivery::{
    Delivery, DeliveryConfig, DeliveryMode, DeliveryStatus, InterruptLine, InterruptSource,
    NoInterrupts, RateChange, ReportHandler, DEFAULT_SAMPLING_RATE, DEFAULT_TICKS_PER_SECOND,
};
pub use error::TransportError;
pub use protocol::{DescriptorLayout, DeviceDescriptor};
pub use rdesc::{Field, ReportDescriptor, ReportKind, Usage, UsageRange};
pub use sim::{SimulatedDevice, SimulatedInterrupt};
pub use types::{HardwareIdentity, InputReport, ReportType};

use async_trait::async_trait;
use std::sync::Arc;

/// The bus primitive every operation is built on.
///
/// Implementations must perform the write and the read as one transaction
/// (repeated start, no stop in between) and either return exactly
/// `read_len` bytes or fail.
#[async_trait]
pub trait I2cBus: Send + Sync {
    /// Write `write` to the device at `address`, then read `read_len` bytes
    ///
    /// # Arguments
    /// * `address` - 7-bit slave address
    /// * `write` - Register address (little-endian) followed by any command bytes
    /// * `read_len` - Number of bytes to read back
    async fn transfer(
        &self,
        address: u16,
        write: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, TransportError>;

    /// Human-readable bus name for logs
    fn name(&self) -> String;
}

/// Type alias for a shared bus
pub type BoxedBus = Arc<dyn I2cBus>;
