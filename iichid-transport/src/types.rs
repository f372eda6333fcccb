//! Common types for transport layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a device lives on the bus and how to reach its HID descriptor.
///
/// Produced once by the firmware resolver (or taken from configuration) and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIdentity {
    /// 7-bit I2C slave address. Zero is never a valid device.
    pub address: u16,
    /// First interrupt listed by firmware
    #[serde(default)]
    pub irq: Option<u32>,
    /// First GPIO interrupt pin listed by firmware
    #[serde(default)]
    pub gpio_pin: Option<u16>,
    /// Register holding the 30-byte HID descriptor
    pub descriptor_register: u16,
    /// Firmware hardware id (e.g. "PNP0C50")
    #[serde(default)]
    pub hardware_id: String,
}

impl fmt::Display for HardwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} addr=0x{:02X} desc_reg=0x{:04X}",
            if self.hardware_id.is_empty() {
                "<unnamed>"
            } else {
                &self.hardware_id
            },
            self.address,
            self.descriptor_register
        )?;
        if let Some(irq) = self.irq {
            write!(f, " irq={irq}")?;
        }
        if let Some(pin) = self.gpio_pin {
            write!(f, " gpio=0x{pin:02X}")?;
        }
        Ok(())
    }
}

/// HID report type as encoded in GET_REPORT command frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

impl ReportType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::Feature),
            _ => None,
        }
    }
}

/// One raw read of the input register.
///
/// The buffer always has the configured input size; only the first
/// `actual_len` bytes (as announced by the device) are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReport {
    buf: Vec<u8>,
    actual_len: usize,
}

impl InputReport {
    pub(crate) fn new(buf: Vec<u8>, actual_len: usize) -> Self {
        Self { buf, actual_len }
    }

    /// Length announced by the device's 2-byte prefix (prefix included)
    pub fn actual_len(&self) -> usize {
        self.actual_len
    }

    /// A length of two or less means the device had nothing to report.
    pub fn is_empty(&self) -> bool {
        self.actual_len <= 2
    }

    /// Report bytes after the length prefix.
    ///
    /// Clamped to the buffer when a device announces more than it was asked
    /// to deliver.
    pub fn payload(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        let end = self.actual_len.min(self.buf.len());
        self.buf.get(2..end).unwrap_or(&[])
    }

    pub fn raw(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_report_payload() {
        let report = InputReport::new(vec![0x05, 0x00, 0xAA, 0xBB, 0xCC, 0xFF, 0xFF], 5);
        assert_eq!(report.payload(), &[0xAA, 0xBB, 0xCC]);
        assert!(!report.is_empty());
    }

    #[test]
    fn test_input_report_empty_poll() {
        for len in 0..=2 {
            let report = InputReport::new(vec![len as u8, 0x00, 0x11, 0x22], len);
            assert!(report.is_empty());
            assert!(report.payload().is_empty());
        }
    }

    #[test]
    fn test_input_report_clamped() {
        let report = InputReport::new(vec![0x40, 0x00, 0x01, 0x02], 0x40);
        assert_eq!(report.payload(), &[0x01, 0x02]);
    }

    #[test]
    fn test_identity_display() {
        let id = HardwareIdentity {
            address: 0x2C,
            irq: Some(51),
            gpio_pin: None,
            descriptor_register: 0x20,
            hardware_id: "PNP0C50".into(),
        };
        assert_eq!(id.to_string(), "PNP0C50 addr=0x2C desc_reg=0x0020 irq=51");
    }
}
