//! Input events, numbered the way Linux evdev numbers them

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Event type (`EV_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum EventType {
    Syn = 0x00,
    Key = 0x01,
    Rel = 0x02,
    Abs = 0x03,
    Msc = 0x04,
    Pwr = 0x16,
}

impl EventType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x00 => Some(Self::Syn),
            0x01 => Some(Self::Key),
            0x02 => Some(Self::Rel),
            0x03 => Some(Self::Abs),
            0x04 => Some(Self::Msc),
            0x16 => Some(Self::Pwr),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Syn => "EV_SYN",
            Self::Key => "EV_KEY",
            Self::Rel => "EV_REL",
            Self::Abs => "EV_ABS",
            Self::Msc => "EV_MSC",
            Self::Pwr => "EV_PWR",
        }
    }
}

/// Event codes used by the built-in tables
pub mod codes {
    pub const SYN_REPORT: u16 = 0;

    pub const REL_X: u16 = 0x00;
    pub const REL_Y: u16 = 0x01;
    pub const REL_HWHEEL: u16 = 0x06;
    pub const REL_WHEEL: u16 = 0x08;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_PRESSURE: u16 = 0x18;
    pub const ABS_TILT_X: u16 = 0x1a;
    pub const ABS_TILT_Y: u16 = 0x1b;

    pub const KEY_UP: u16 = 103;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_DOWN: u16 = 108;
    pub const KEY_POWER: u16 = 116;
    pub const KEY_HELP: u16 = 138;
    pub const KEY_MENU: u16 = 139;
    pub const KEY_SLEEP: u16 = 142;
    pub const KEY_WAKEUP: u16 = 143;
    pub const KEY_PROG1: u16 = 148;
    pub const KEY_EXIT: u16 = 174;
    pub const KEY_SELECT: u16 = 0x161;
    pub const KEY_POWER2: u16 = 0x164;
    pub const KEY_RESTART: u16 = 0x198;
    pub const KEY_CONTEXT_MENU: u16 = 0x1b6;

    pub const BTN_MOUSE: u16 = 0x110;
    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_RIGHT: u16 = 0x111;
    pub const BTN_MIDDLE: u16 = 0x112;
    pub const BTN_TOOL_PEN: u16 = 0x140;
    pub const BTN_TOOL_RUBBER: u16 = 0x141;
    pub const BTN_TOUCH: u16 = 0x14a;
    pub const BTN_STYLUS: u16 = 0x14b;
    pub const BTN_STYLUS2: u16 = 0x14c;
}

/// One decoded input event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "type")]
    pub ty: EventType,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub const fn new(ty: EventType, code: u16, value: i32) -> Self {
        Self { ty, code, value }
    }

    /// End-of-report marker
    pub const fn syn_report() -> Self {
        Self::new(EventType::Syn, codes::SYN_REPORT, 0)
    }

    pub fn is_syn_report(&self) -> bool {
        self.ty == EventType::Syn && self.code == codes::SYN_REPORT
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_syn_report() {
            return write!(f, "-------------- SYN_REPORT ------------");
        }
        write!(
            f,
            "type {} ({}), code 0x{:03x}, value {}",
            self.ty as u16,
            self.ty.name(),
            self.code,
            self.value
        )
    }
}

/// Where decoded events go
pub trait EventSink {
    fn emit(&mut self, event: InputEvent);
}

impl EventSink for Vec<InputEvent> {
    fn emit(&mut self, event: InputEvent) {
        self.push(event);
    }
}

impl EventSink for broadcast::Sender<InputEvent> {
    fn emit(&mut self, event: InputEvent) {
        // no subscribers is fine, events are simply dropped
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<InputEvent> {
    fn emit(&mut self, event: InputEvent) {
        let _ = self.send(event);
    }
}

/// Input device properties (`INPUT_PROP_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputProperty {
    /// Needs a pointer on screen (touchpads, tablets)
    Pointer = 0x00,
    /// Direct input device (touchscreens, screen pens)
    Direct = 0x01,
}

/// What a mapped device can emit, declared once at attach
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDeclaration {
    events: BTreeSet<(EventType, u16)>,
    types: BTreeSet<EventType>,
    properties: BTreeSet<InputProperty>,
}

impl InputDeclaration {
    pub fn new() -> Self {
        let mut decl = Self::default();
        decl.support_event(EventType::Syn, codes::SYN_REPORT);
        decl
    }

    /// Declare a whole event type without a specific code
    pub fn support_type(&mut self, ty: EventType) {
        self.types.insert(ty);
    }

    pub fn support_event(&mut self, ty: EventType, code: u16) {
        self.types.insert(ty);
        self.events.insert((ty, code));
    }

    pub fn support_property(&mut self, prop: InputProperty) {
        self.properties.insert(prop);
    }

    pub fn supports_type(&self, ty: EventType) -> bool {
        self.types.contains(&ty)
    }

    pub fn supports(&self, ty: EventType, code: u16) -> bool {
        self.events.contains(&(ty, code))
    }

    pub fn has_property(&self, prop: InputProperty) -> bool {
        self.properties.contains(&prop)
    }

    pub fn events(&self) -> impl Iterator<Item = (EventType, u16)> + '_ {
        self.events.iter().copied()
    }

    pub fn types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.types.iter().copied()
    }

    pub fn properties(&self) -> impl Iterator<Item = InputProperty> + '_ {
        self.properties.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_always_has_syn() {
        let decl = InputDeclaration::new();
        assert!(decl.supports(EventType::Syn, codes::SYN_REPORT));
        assert!(!decl.supports_type(EventType::Key));
    }

    #[test]
    fn test_support_type_without_codes() {
        let mut decl = InputDeclaration::new();
        decl.support_type(EventType::Pwr);
        assert!(decl.supports_type(EventType::Pwr));
        assert_eq!(decl.events().filter(|(ty, _)| *ty == EventType::Pwr).count(), 0);
    }

    #[test]
    fn test_event_type_numbering() {
        assert_eq!(EventType::Pwr as u16, 0x16);
        assert_eq!(EventType::from_u16(2), Some(EventType::Rel));
        assert_eq!(EventType::from_u16(0x05), None);
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<InputEvent> = Vec::new();
        sink.emit(InputEvent::new(EventType::Key, codes::BTN_LEFT, 1));
        sink.emit(InputEvent::syn_report());
        assert_eq!(sink.len(), 2);
        assert!(sink[1].is_syn_report());
    }
}
