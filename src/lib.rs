// iichid - userspace HID over I2C driver
// Device configuration, map profiles and the Linux i2c-dev bus

pub mod config;
pub mod hexfile;
pub mod i2cdev;
pub mod profile;

pub use config::{DeviceConfig, SimulationConfig, AUTO_PROFILE};
pub use hexfile::{load_bytes, parse_hex, HexError};
pub use i2cdev::LinuxI2cBus;
pub use profile::{profile_registry, CustomProfile, LoadError, MapProfile, ProfileRegistry};
