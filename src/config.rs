//! Device configuration
//!
//! One TOML file describes where the device lives (bus, address or firmware
//! nodes to resolve it from), which profile maps it and how reports are
//! delivered. A `[simulation]` table replaces the real bus with an in-memory
//! device for `iichid simulate`.

use anyhow::{anyhow, bail, Context};
use iichid_map::{AttachConfig, DeliveryConfig, HardwareIdentity, DEFAULT_EVENT_CAPACITY};
use iichid_transport::{enumerate_unclaimed, lookup, FirmwareNode, StaticNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Profile name meaning "pick by application collection"
pub const AUTO_PROFILE: &str = "auto";

/// In-memory device replaying canned reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Report descriptor file (binary or hex text)
    pub report_descriptor: PathBuf,
    #[serde(default)]
    pub vendor_id: u16,
    #[serde(default)]
    pub product_id: u16,
    /// Input reports as hex strings, replayed in order
    #[serde(default)]
    pub reports: Vec<String>,
    /// Delay between replayed reports
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Give the device an interrupt line; without one it is polled
    #[serde(default = "default_true")]
    pub interrupt: bool,
    /// Sampling rate to set once attached (-1 for interrupt mode)
    #[serde(default)]
    pub sampling_rate: Option<i32>,
}

fn default_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// i2c-dev adapter
    #[serde(default = "default_bus")]
    pub bus: PathBuf,
    /// Slave address; when unset the first unclaimed firmware node is used
    #[serde(default)]
    pub address: Option<u16>,
    /// HID descriptor register for a manually addressed device
    #[serde(default = "default_descriptor_register")]
    pub descriptor_register: u16,
    #[serde(default)]
    pub hardware_id: String,
    /// Profile name, or "auto"
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Extra directories with TOML profiles
    #[serde(default)]
    pub profile_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
    /// Firmware nodes to resolve the identity from
    #[serde(default)]
    pub nodes: Vec<StaticNode>,
}

fn default_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_descriptor_register() -> u16 {
    0x0001
}

fn default_profile() -> String {
    AUTO_PROFILE.to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            address: None,
            descriptor_register: default_descriptor_register(),
            hardware_id: String::new(),
            profile: default_profile(),
            profile_dirs: Vec::new(),
            debug: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            delivery: DeliveryConfig::default(),
            simulation: None,
            nodes: Vec::new(),
        }
    }
}

impl DeviceConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iichid")
            .join("device.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: DeviceConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            debug!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn firmware_nodes(&self) -> impl Iterator<Item = &dyn FirmwareNode> {
        self.nodes.iter().map(|node| node as &dyn FirmwareNode)
    }

    /// Identity of the configured device.
    ///
    /// With an address, a firmware node at that address wins over the manual
    /// settings. Without one, the first node resolving to a free address is
    /// used.
    pub fn identity(&self) -> anyhow::Result<HardwareIdentity> {
        if let Some(address) = self.address {
            if address == 0 || address > 0x7F {
                bail!("invalid I2C address 0x{:02x}", address);
            }
            if let Some(identity) = lookup(self.firmware_nodes(), address) {
                debug!("Address 0x{:02x} resolved from firmware: {}", address, identity);
                return Ok(identity);
            }
            return Ok(HardwareIdentity {
                address,
                irq: None,
                gpio_pin: None,
                descriptor_register: self.descriptor_register,
                hardware_id: self.hardware_id.clone(),
            });
        }

        enumerate_unclaimed(self.firmware_nodes(), &[])
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no address configured and no HID over I2C firmware node found"))
    }

    pub fn attach_config(&self) -> AttachConfig {
        AttachConfig {
            delivery: self.delivery,
            debug: self.debug,
            event_capacity: self.event_capacity,
        }
    }
}
