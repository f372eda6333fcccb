//! Hardware identity from platform firmware
//!
//! A firmware node describes one device: its hardware id, presence status,
//! current resource settings (bus connection, interrupts, GPIOs) and a
//! device-specific method returning the HID descriptor register.
//! [`FirmwareNode`] abstracts over where that information comes from; the
//! [`StaticNode`] implementation reads it from configuration.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::HID_OVER_I2C_IDS;
use crate::types::HardwareIdentity;

/// HID over I2C device-specific method GUID
/// (3cdff6f7-4267-4555-ad05-b30a3d8938de, mixed-endian byte order)
pub const DSM_GUID: [u8; 16] = [
    0xF7, 0xF6, 0xDF, 0x3C, 0x67, 0x42, 0x55, 0x45, 0xAD, 0x05, 0xB3, 0x0A, 0x3D, 0x89, 0x38, 0xDE,
];
pub const DSM_REVISION: u64 = 1;
/// Function index returning the HID descriptor register
pub const DSM_FUNCTION_DESCRIPTOR: u64 = 1;

/// Status bits meaning "present" in a device status word
const STATUS_PRESENT: u32 = 0x01;

/// Serial bus type codes used in serial-bus resource entries
pub mod bus_type {
    pub const I2C: u8 = 1;
    pub const SPI: u8 = 2;
    pub const UART: u8 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioConnection {
    Interrupt,
    Io,
}

/// One entry of a node's current resource settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Resource {
    SerialBus {
        bus_type: u8,
        address: u16,
    },
    ExtendedIrq {
        interrupts: Vec<u32>,
    },
    Gpio {
        connection: GpioConnection,
        pins: Vec<u16>,
    },
    EndTag,
    /// Anything else, by raw type code
    Other {
        code: u8,
    },
}

/// Result of evaluating a device-specific method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DsmValue {
    Integer(u64),
    Buffer(Vec<u8>),
    String(String),
}

/// Access to one firmware device node
pub trait FirmwareNode {
    /// Hardware id string, if the node has one
    fn hardware_id(&self) -> Option<&str>;

    /// Device status word; None when the node has no status method
    fn status(&self) -> Option<u32>;

    /// Current resource settings
    fn current_resources(&self) -> Result<Vec<Resource>, TransportError>;

    /// Evaluate the device-specific method. `NotFound` when absent.
    fn evaluate_dsm(
        &self,
        guid: &[u8; 16],
        revision: u64,
        function: u64,
    ) -> Result<DsmValue, TransportError>;
}

/// Whether `node` is a present HID over I2C device.
///
/// Nodes without a status method are assumed present.
pub fn is_hid_over_i2c(node: &dyn FirmwareNode) -> bool {
    let Some(hid) = node.hardware_id() else {
        return false;
    };
    if !HID_OVER_I2C_IDS.contains(&hid) {
        return false;
    }
    node.status()
        .map_or(true, |sta| sta & STATUS_PRESENT != 0)
}

/// Build the identity of one node from its resources and descriptor method.
pub fn resolve_identity(node: &dyn FirmwareNode) -> Result<HardwareIdentity, TransportError> {
    let mut address = None;
    let mut irq = None;
    let mut gpio_pin = None;

    for resource in node.current_resources()? {
        match resource {
            Resource::SerialBus { bus_type: kind, address: addr } => {
                if kind != bus_type::I2C {
                    return Err(TransportError::ProtocolMismatch(format!(
                        "wrong bus type, should be {} is {}",
                        bus_type::I2C,
                        kind
                    )));
                }
                address = Some(addr);
            }
            // first listed interrupt and first interrupt pin win
            Resource::ExtendedIrq { interrupts } => {
                if irq.is_none() {
                    irq = interrupts.first().copied();
                }
            }
            Resource::Gpio { connection, pins } => {
                if connection == GpioConnection::Interrupt && gpio_pin.is_none() {
                    gpio_pin = pins.first().copied();
                }
            }
            Resource::EndTag => {}
            Resource::Other { code } => {
                debug!("Unexpected type {} while parsing current resources", code);
            }
        }
    }

    let descriptor_register = match node.evaluate_dsm(&DSM_GUID, DSM_REVISION, DSM_FUNCTION_DESCRIPTOR)? {
        DsmValue::Integer(value) => u16::try_from(value).map_err(|_| {
            TransportError::NotFound(format!("descriptor register 0x{value:x} out of range"))
        })?,
        other => {
            return Err(TransportError::NotFound(format!(
                "descriptor method should return an integer, got {:?}",
                other
            )))
        }
    };

    let address = address
        .ok_or_else(|| TransportError::NotFound("no serial bus resource".to_string()))?;

    Ok(HardwareIdentity {
        address,
        irq,
        gpio_pin,
        descriptor_register,
        hardware_id: node.hardware_id().unwrap_or_default().to_string(),
    })
}

/// Identity of the device at bus `address`.
///
/// Nodes are walked in order and the first HID over I2C node resolving to
/// `address` wins; later nodes claiming the same address are ignored.
pub fn lookup<'a, I>(nodes: I, address: u16) -> Option<HardwareIdentity>
where
    I: IntoIterator<Item = &'a dyn FirmwareNode>,
{
    nodes
        .into_iter()
        .filter(|node| is_hid_over_i2c(*node))
        .filter_map(|node| match resolve_identity(node) {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("Skipping firmware node: {}", e);
                None
            }
        })
        .find(|identity| identity.address == address)
}

/// Identities of HID over I2C nodes whose address nobody has claimed yet,
/// in walk order.
pub fn enumerate_unclaimed<'a, I>(nodes: I, claimed: &[u16]) -> Vec<HardwareIdentity>
where
    I: IntoIterator<Item = &'a dyn FirmwareNode>,
{
    let mut found: Vec<HardwareIdentity> = Vec::new();
    for node in nodes {
        if !is_hid_over_i2c(node) {
            continue;
        }
        let identity = match resolve_identity(node) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Could not resolve {:?}: {}", node.hardware_id(), e);
                continue;
            }
        };
        if claimed.contains(&identity.address)
            || found.iter().any(|f| f.address == identity.address)
        {
            debug!("Address 0x{:02x} already in use", identity.address);
            continue;
        }
        found.push(identity);
    }
    found
}

/// Firmware node described in configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticNode {
    #[serde(default)]
    pub hardware_id: Option<String>,
    #[serde(default)]
    pub status: Option<u32>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Descriptor method result; absent means the method does not exist
    #[serde(default)]
    pub dsm: Option<DsmValue>,
}

impl FirmwareNode for StaticNode {
    fn hardware_id(&self) -> Option<&str> {
        self.hardware_id.as_deref()
    }

    fn status(&self) -> Option<u32> {
        self.status
    }

    fn current_resources(&self) -> Result<Vec<Resource>, TransportError> {
        Ok(self.resources.clone())
    }

    fn evaluate_dsm(
        &self,
        guid: &[u8; 16],
        _revision: u64,
        _function: u64,
    ) -> Result<DsmValue, TransportError> {
        if guid != &DSM_GUID {
            return Err(TransportError::NotFound("unknown method GUID".to_string()));
        }
        self.dsm
            .clone()
            .ok_or_else(|| TransportError::NotFound("error evaluating _DSM".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touchpad(address: u16) -> StaticNode {
        StaticNode {
            hardware_id: Some("PNP0C50".into()),
            status: None,
            resources: vec![
                Resource::SerialBus {
                    bus_type: bus_type::I2C,
                    address,
                },
                Resource::Gpio {
                    connection: GpioConnection::Io,
                    pins: vec![7],
                },
                Resource::Gpio {
                    connection: GpioConnection::Interrupt,
                    pins: vec![0x32, 0x33],
                },
                Resource::ExtendedIrq {
                    interrupts: vec![51, 52],
                },
                Resource::Other { code: 9 },
                Resource::EndTag,
            ],
            dsm: Some(DsmValue::Integer(0x20)),
        }
    }

    #[test]
    fn test_resolve_identity() {
        let id = resolve_identity(&touchpad(0x2C)).unwrap();
        assert_eq!(id.address, 0x2C);
        assert_eq!(id.irq, Some(51));
        assert_eq!(id.gpio_pin, Some(0x32));
        assert_eq!(id.descriptor_register, 0x20);
        assert_eq!(id.hardware_id, "PNP0C50");
    }

    #[test]
    fn test_first_interrupt_resources_win() {
        let mut node = touchpad(0x2C);
        node.resources.insert(
            4,
            Resource::ExtendedIrq {
                interrupts: vec![99],
            },
        );
        node.resources.insert(
            4,
            Resource::Gpio {
                connection: GpioConnection::Interrupt,
                pins: vec![0x40],
            },
        );
        let id = resolve_identity(&node).unwrap();
        assert_eq!(id.irq, Some(51));
        assert_eq!(id.gpio_pin, Some(0x32));
    }

    #[test]
    fn test_wrong_bus_type() {
        let mut node = touchpad(0x2C);
        node.resources[0] = Resource::SerialBus {
            bus_type: bus_type::SPI,
            address: 0x2C,
        };
        assert!(matches!(
            resolve_identity(&node),
            Err(TransportError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_dsm_must_be_integer() {
        let mut node = touchpad(0x2C);
        node.dsm = Some(DsmValue::Buffer(vec![0x20]));
        assert!(matches!(
            resolve_identity(&node),
            Err(TransportError::NotFound(_))
        ));

        node.dsm = None;
        assert!(matches!(
            resolve_identity(&node),
            Err(TransportError::NotFound(_))
        ));
    }

    #[test]
    fn test_presence() {
        let mut node = touchpad(0x2C);
        assert!(is_hid_over_i2c(&node));
        node.status = Some(0x0F);
        assert!(is_hid_over_i2c(&node));
        node.status = Some(0x00);
        assert!(!is_hid_over_i2c(&node));

        node.status = None;
        node.hardware_id = Some("ACPI0C50".into());
        assert!(is_hid_over_i2c(&node));
        node.hardware_id = Some("PNP0303".into());
        assert!(!is_hid_over_i2c(&node));
    }

    #[test]
    fn test_lookup_first_match_wins() {
        let mut first = touchpad(0x2C);
        first.dsm = Some(DsmValue::Integer(0x01));
        let mut second = touchpad(0x2C);
        second.dsm = Some(DsmValue::Integer(0x20));
        let other = touchpad(0x15);

        let nodes: Vec<&dyn FirmwareNode> = vec![&other, &first, &second];
        let id = lookup(nodes.iter().copied(), 0x2C).unwrap();
        assert_eq!(id.descriptor_register, 0x01);

        assert!(lookup(nodes.iter().copied(), 0x40).is_none());
    }

    #[test]
    fn test_enumerate_unclaimed() {
        let a = touchpad(0x2C);
        let b = touchpad(0x15);
        let dup = touchpad(0x15);
        let mut broken = touchpad(0x10);
        broken.dsm = None;

        let nodes: Vec<&dyn FirmwareNode> = vec![&a, &broken, &b, &dup];
        let found = enumerate_unclaimed(nodes, &[0x2C]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 0x15);
    }
}
