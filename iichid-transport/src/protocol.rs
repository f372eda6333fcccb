//! Protocol constants and wire structures for HID over I2C

use crate::error::TransportError;
use crate::types::ReportType;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Command register opcodes (HID over I2C 1.0, section 7.2)
pub mod opcode {
    pub const RESET: u8 = 0x01;
    pub const GET_REPORT: u8 = 0x02;
    pub const SET_REPORT: u8 = 0x03;
    pub const GET_IDLE: u8 = 0x04;
    pub const SET_IDLE: u8 = 0x05;
    pub const GET_PROTOCOL: u8 = 0x06;
    pub const SET_PROTOCOL: u8 = 0x07;
    pub const SET_POWER: u8 = 0x08;

    /// Get opcode name for debugging
    pub fn name(op: u8) -> &'static str {
        match op {
            RESET => "RESET",
            GET_REPORT => "GET_REPORT",
            SET_REPORT => "SET_REPORT",
            GET_IDLE => "GET_IDLE",
            SET_IDLE => "SET_IDLE",
            GET_PROTOCOL => "GET_PROTOCOL",
            SET_PROTOCOL => "SET_PROTOCOL",
            SET_POWER => "SET_POWER",
            _ => "UNKNOWN",
        }
    }
}

/// Firmware identifiers that mark a node as an I2C HID device
pub const HID_OVER_I2C_IDS: &[&str] = &["PNP0C50", "ACPI0C50"];

/// Size of the HID descriptor in bytes
pub const DESCRIPTOR_LEN: usize = 30;

/// The only descriptor version this driver speaks (BCD 1.00)
pub const PROTOCOL_VERSION: u16 = 0x0100;

/// Size of the little-endian length prefix on input reports and responses
pub const LENGTH_PREFIX: usize = 2;

/// Report ids at or above this value do not fit in the command nibble and
/// are sent as an extra byte.
pub const REPORT_ID_ESCAPE: u8 = 15;

/// HID descriptor as stored on the device.
///
/// Fields hold the raw little-endian wire values; use the accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DeviceDescriptor {
    hid_desc_length: u16,
    bcd_version: u16,
    report_desc_length: u16,
    report_desc_register: u16,
    input_register: u16,
    max_input_length: u16,
    output_register: u16,
    max_output_length: u16,
    command_register: u16,
    data_register: u16,
    vendor_id: u16,
    product_id: u16,
    version_id: u16,
    reserved: [u8; 4],
}

impl DeviceDescriptor {
    /// Parse and validate a descriptor read from the device.
    pub fn parse(bytes: &[u8]) -> Result<Self, TransportError> {
        let desc = Self::read_from_bytes(bytes).map_err(|_| {
            TransportError::MalformedDescriptor(format!(
                "expected {} bytes, got {}",
                DESCRIPTOR_LEN,
                bytes.len()
            ))
        })?;
        desc.validate()?;
        Ok(desc)
    }

    /// Check the self-reported length and protocol version.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.length() as usize != DESCRIPTOR_LEN {
            return Err(TransportError::MalformedDescriptor(format!(
                "descriptor length {} (expected {})",
                self.length(),
                DESCRIPTOR_LEN
            )));
        }
        if self.version() != PROTOCOL_VERSION {
            return Err(TransportError::MalformedDescriptor(format!(
                "version 0x{:04X} (expected 0x{:04X})",
                self.version(),
                PROTOCOL_VERSION
            )));
        }
        Ok(())
    }

    pub fn length(&self) -> u16 {
        u16::from_le(self.hid_desc_length)
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.bcd_version)
    }

    pub fn report_desc_length(&self) -> u16 {
        u16::from_le(self.report_desc_length)
    }

    pub fn report_desc_register(&self) -> u16 {
        u16::from_le(self.report_desc_register)
    }

    pub fn input_register(&self) -> u16 {
        u16::from_le(self.input_register)
    }

    pub fn max_input_length(&self) -> u16 {
        u16::from_le(self.max_input_length)
    }

    pub fn output_register(&self) -> u16 {
        u16::from_le(self.output_register)
    }

    pub fn max_output_length(&self) -> u16 {
        u16::from_le(self.max_output_length)
    }

    pub fn command_register(&self) -> u16 {
        u16::from_le(self.command_register)
    }

    pub fn data_register(&self) -> u16 {
        u16::from_le(self.data_register)
    }

    pub fn vendor_id(&self) -> u16 {
        u16::from_le(self.vendor_id)
    }

    pub fn product_id(&self) -> u16 {
        u16::from_le(self.product_id)
    }

    pub fn version_id(&self) -> u16 {
        u16::from_le(self.version_id)
    }
}

/// Builder for a device-side descriptor image (simulators and tests)
#[derive(Debug, Clone, Copy)]
pub struct DescriptorLayout {
    pub report_desc_length: u16,
    pub report_desc_register: u16,
    pub input_register: u16,
    pub max_input_length: u16,
    pub output_register: u16,
    pub max_output_length: u16,
    pub command_register: u16,
    pub data_register: u16,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version_id: u16,
}

impl Default for DescriptorLayout {
    /// Register map commonly used by touchpad controllers
    fn default() -> Self {
        Self {
            report_desc_length: 0,
            report_desc_register: 0x0002,
            input_register: 0x0003,
            max_input_length: 0,
            output_register: 0x0004,
            max_output_length: 0,
            command_register: 0x0005,
            data_register: 0x0006,
            vendor_id: 0,
            product_id: 0,
            version_id: 0x0100,
        }
    }
}

impl DescriptorLayout {
    pub fn build(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            hid_desc_length: (DESCRIPTOR_LEN as u16).to_le(),
            bcd_version: PROTOCOL_VERSION.to_le(),
            report_desc_length: self.report_desc_length.to_le(),
            report_desc_register: self.report_desc_register.to_le(),
            input_register: self.input_register.to_le(),
            max_input_length: self.max_input_length.to_le(),
            output_register: self.output_register.to_le(),
            max_output_length: self.max_output_length.to_le(),
            command_register: self.command_register.to_le(),
            data_register: self.data_register.to_le(),
            vendor_id: self.vendor_id.to_le(),
            product_id: self.product_id.to_le(),
            version_id: self.version_id.to_le(),
            reserved: [0; 4],
        }
    }
}

/// Register address as written on the wire
pub fn register_bytes(register: u16) -> [u8; 2] {
    register.to_le_bytes()
}

/// Decode a 2-byte little-endian length prefix.
pub fn length_prefix(buf: &[u8]) -> usize {
    match buf {
        [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]) as usize,
        _ => 0,
    }
}

/// GET_REPORT command frame.
///
/// Ids below 15 are packed into the low nibble of the third byte; larger ids
/// put 15 there and follow the opcode with the real id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReportFrame {
    bytes: Vec<u8>,
    echoed_id_len: usize,
}

impl GetReportFrame {
    pub fn new(command_register: u16, data_register: u16, report_type: ReportType, id: u8) -> Self {
        let [cmd_lo, cmd_hi] = register_bytes(command_register);
        let [data_lo, data_hi] = register_bytes(data_register);
        let type_bits = (report_type as u8) << 4;

        let (bytes, echoed_id_len) = if id >= REPORT_ID_ESCAPE {
            (
                vec![
                    cmd_lo,
                    cmd_hi,
                    type_bits | REPORT_ID_ESCAPE,
                    opcode::GET_REPORT,
                    id,
                    data_lo,
                    data_hi,
                ],
                2,
            )
        } else {
            (
                vec![cmd_lo, cmd_hi, type_bits | id, opcode::GET_REPORT, data_lo, data_hi],
                1,
            )
        };

        Self {
            bytes,
            echoed_id_len,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes the device echoes back before the payload
    pub fn echoed_id_len(&self) -> usize {
        self.echoed_id_len
    }

    /// Total bytes to read for a payload of `len` bytes
    pub fn response_len(&self, len: usize) -> usize {
        len + LENGTH_PREFIX + self.echoed_id_len
    }

    /// Parse a frame back into (report type, id); used by device emulation.
    pub fn decode(frame: &[u8]) -> Option<(ReportType, u8)> {
        match frame {
            [_, _, selector, opcode::GET_REPORT, rest @ ..] => {
                let report_type = ReportType::from_u8(selector >> 4)?;
                let low = selector & 0x0F;
                if low == REPORT_ID_ESCAPE {
                    rest.first().map(|id| (report_type, *id))
                } else {
                    Some((report_type, low))
                }
            }
            _ => None,
        }
    }
}
