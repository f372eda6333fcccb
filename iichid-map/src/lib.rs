//! Descriptor-driven input mapping for HID over I2C devices
//!
//! A driver hands over a table of wanted usages ([`MapEntry`]); the engine
//! resolves it against the device's report descriptor once, then turns
//! every input report into [`InputEvent`]s with no per-device parsing code.
//! [`HidDevice`] runs the whole lifecycle on top of the transport crate.

pub mod binding;
pub mod device;
pub mod error;
pub mod event;
pub mod item;
pub mod map;
pub mod usages;

pub use binding::{extract, Binding, BindingKind, Capabilities, KeyRun};
pub use device::{AttachConfig, HidDevice, DEFAULT_EVENT_CAPACITY};
pub use error::MapError;
pub use event::{codes, EventSink, EventType, InputDeclaration, InputEvent, InputProperty};
pub use item::{CallbackStatus, MapCallback, MapEntry, Phase, RelAbs, Target};
pub use map::HidMap;

// Consumers of the map usually need the transport types too
pub use iichid_transport::{
    DeliveryConfig, DeliveryMode, DeliveryStatus, HardwareIdentity, RateChange, ReportDescriptor,
    TransportError, Usage,
};
