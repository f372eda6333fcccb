//! Command engine: the register-addressed request/response operations
//!
//! Every operation is one bus transaction built on [`CommandEngine::fetch_buffer`]:
//! write a register address (and optional command bytes) without a stop
//! condition, then read a fixed number of bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::{self, DeviceDescriptor, GetReportFrame, DESCRIPTOR_LEN, LENGTH_PREFIX};
use crate::rdesc::ReportDescriptor;
use crate::types::{HardwareIdentity, InputReport, ReportType};
use crate::BoxedBus;

/// Format bytes as space-separated hex for debug dumps
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Report descriptor bytes together with what they say about input size
#[derive(Debug, Clone)]
pub struct FetchedReportDescriptor {
    pub bytes: Vec<u8>,
    pub parsed: ReportDescriptor,
    /// Computed input buffer size, length prefix included
    pub input_size: usize,
}

/// Talks the HID over I2C protocol to one device.
pub struct CommandEngine {
    bus: BoxedBus,
    identity: HardwareIdentity,
    descriptor: DeviceDescriptor,
    input_size: AtomicUsize,
    debug: bool,
}

impl CommandEngine {
    /// Fetch and validate the HID descriptor, then return an engine bound to
    /// its register map.
    pub async fn connect(
        bus: BoxedBus,
        identity: HardwareIdentity,
        debug: bool,
    ) -> Result<Self, TransportError> {
        if identity.address == 0 {
            return Err(TransportError::NotFound(format!(
                "{} has no bus address",
                identity.hardware_id
            )));
        }

        if debug {
            debug!("  Hardware ID       : {}", identity.hardware_id);
            debug!("  Bus address       : 0x{:02X}", identity.address);
            debug!("  IRQ               : {:?}", identity.irq);
            debug!("  GPIO pin          : {:?}", identity.gpio_pin);
            debug!("  HID descriptor reg: 0x{:02X}", identity.descriptor_register);
        }

        let descriptor = fetch_descriptor(&bus, &identity).await?;

        Ok(Self {
            bus,
            input_size: AtomicUsize::new(descriptor.max_input_length() as usize),
            identity,
            descriptor,
            debug,
        })
    }

    pub fn identity(&self) -> &HardwareIdentity {
        &self.identity
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Bytes read per input poll, length prefix included.
    ///
    /// Starts at the advertised maximum and is replaced by the computed size
    /// once the report descriptor has been fetched.
    pub fn input_size(&self) -> usize {
        self.input_size.load(Ordering::Acquire)
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// One write-then-read transaction against this device.
    pub async fn fetch_buffer(&self, command: &[u8], read_len: usize) -> Result<Vec<u8>, TransportError> {
        let buf = self
            .bus
            .transfer(self.identity.address, command, read_len)
            .await?;
        if buf.len() != read_len {
            return Err(TransportError::Io(format!(
                "short read: wanted {} bytes, got {}",
                read_len,
                buf.len()
            )));
        }
        Ok(buf)
    }

    /// Re-read and validate the HID descriptor.
    pub async fn fetch_descriptor(&self) -> Result<DeviceDescriptor, TransportError> {
        fetch_descriptor(&self.bus, &self.identity).await
    }

    /// Read the input register once.
    pub async fn fetch_input_report(&self) -> Result<InputReport, TransportError> {
        let register = protocol::register_bytes(self.descriptor.input_register());
        let buf = self
            .fetch_buffer(&register, self.input_size())
            .await
            .inspect_err(|e| warn!("Could not retrieve input report: {}", e))?;
        let actual = protocol::length_prefix(&buf);
        if actual > buf.len() {
            debug!(
                "Device announced {} byte report, buffer holds {}",
                actual,
                buf.len()
            );
        }
        Ok(InputReport::new(buf, actual))
    }

    /// Read the report descriptor and derive the operative input size from it.
    pub async fn fetch_report_descriptor(&self) -> Result<FetchedReportDescriptor, TransportError> {
        let len = self.descriptor.report_desc_length() as usize;
        let register = self.descriptor.report_desc_register();
        if self.debug {
            debug!("Report descriptor at 0x{:x} with size {}", register, len);
        }

        let bytes = self
            .fetch_buffer(&protocol::register_bytes(register), len)
            .await
            .inspect_err(|e| warn!("Could not retrieve report descriptor: {}", e))?;
        if self.debug {
            debug!("Report descriptor: {}", hex_dump(&bytes));
        }

        // Devices misreport wMaxInputLength often enough that only the
        // descriptor itself is trusted.
        let parsed = ReportDescriptor::parse(&bytes);
        let input_size = parsed.input_report_size() + LENGTH_PREFIX;
        let advertised = self.descriptor.max_input_length() as usize;
        if input_size != advertised {
            debug!(
                "Determined (len={}) and described (len={}) input report lengths mismatch",
                input_size, advertised
            );
        }
        self.input_size.store(input_size, Ordering::Release);

        Ok(FetchedReportDescriptor {
            bytes,
            parsed,
            input_size,
        })
    }

    /// GET_REPORT through the command/data registers.
    ///
    /// Returns exactly `len` payload bytes following the echoed report id.
    pub async fn get_report(
        &self,
        report_type: ReportType,
        id: u8,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let frame = GetReportFrame::new(
            self.descriptor.command_register(),
            self.descriptor.data_register(),
            report_type,
            id,
        );
        if self.debug {
            debug!(
                "GET_REPORT id {} (type {:?}, len {}): {}",
                id,
                report_type,
                len,
                hex_dump(frame.as_bytes())
            );
        }

        let response_len = frame.response_len(len);
        let response = self.fetch_buffer(frame.as_bytes(), response_len).await?;

        let announced = protocol::length_prefix(&response);
        if announced != response_len {
            debug!(
                "GET_REPORT response length {} does not match requested {}",
                announced, response_len
            );
        }

        let echoed = match frame.echoed_id_len() {
            2 => u16::from_le_bytes([response[2], response[3]]),
            _ => response[2] as u16,
        };
        if echoed != id as u16 {
            return Err(TransportError::BadMessage {
                expected: id,
                actual: echoed,
            });
        }
        if self.debug {
            debug!("GET_REPORT response: {}", hex_dump(&response));
        }

        let start = LENGTH_PREFIX + frame.echoed_id_len();
        Ok(response[start..].to_vec())
    }
}

async fn fetch_descriptor(
    bus: &BoxedBus,
    identity: &HardwareIdentity,
) -> Result<DeviceDescriptor, TransportError> {
    let register = protocol::register_bytes(identity.descriptor_register);
    let bytes = bus
        .transfer(identity.address, &register, DESCRIPTOR_LEN)
        .await
        .inspect_err(|e| warn!("Could not retrieve HID descriptor: {}", e))?;
    DeviceDescriptor::parse(&bytes).inspect_err(|_| warn!("HID descriptor is broken"))
}

/// Shared handle for the delivery worker and control callers
pub type SharedEngine = Arc<CommandEngine>;
