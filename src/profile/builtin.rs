// Builtin map profiles
// System controls, pens/digitizers and mice, with their usage tables (HUT 1.12)

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use iichid_map::usages::{self, consumer, desktop, digitizer};
use iichid_map::{
    codes, CallbackStatus, EventType, InputProperty, MapCallback, MapEntry, Phase, Usage,
};
use tracing::trace;

use super::traits::MapProfile;

// =============================================================================
// Callbacks
// =============================================================================

/// Battery strength reported by a pen
#[derive(Debug)]
pub struct BatteryStrength {
    level: AtomicI32,
}

impl BatteryStrength {
    pub fn new() -> Self {
        Self {
            level: AtomicI32::new(-1),
        }
    }

    /// Last reported level, None until the pen reported one
    pub fn level(&self) -> Option<i32> {
        let level = self.level.load(Ordering::Relaxed);
        (level >= 0).then_some(level)
    }
}

impl Default for BatteryStrength {
    fn default() -> Self {
        Self::new()
    }
}

impl MapCallback for BatteryStrength {
    fn invoke(&self, phase: Phase<'_>) -> CallbackStatus {
        match phase {
            Phase::Attaching(decl) => decl.support_type(EventType::Pwr),
            Phase::Running { value, .. } => {
                if self.level.swap(value, Ordering::Relaxed) != value {
                    trace!("Battery strength {}", value);
                }
            }
            Phase::Detaching => {}
        }
        CallbackStatus::Continue
    }
}

/// Completion callback that only declares an input property at attach
#[derive(Debug, Clone, Copy)]
pub struct DeclareProperty(pub InputProperty);

impl MapCallback for DeclareProperty {
    fn invoke(&self, phase: Phase<'_>) -> CallbackStatus {
        if let Phase::Attaching(decl) = phase {
            decl.support_property(self.0);
        }
        // nothing to do per report or at detach
        CallbackStatus::Disable
    }
}

// =============================================================================
// System control
// =============================================================================

/// General Desktop system control keys: (name, usage, key code)
pub const SYSTEM_CONTROL_KEYS: &[(&str, u16, u16)] = &[
    ("POWER_DOWN", desktop::SYSTEM_POWER_DOWN, codes::KEY_POWER),
    ("SLEEP", desktop::SYSTEM_SLEEP, codes::KEY_SLEEP),
    ("WAKEUP", desktop::SYSTEM_WAKEUP, codes::KEY_WAKEUP),
    ("CONTEXT_MENU", desktop::SYSTEM_CONTEXT_MENU, codes::KEY_CONTEXT_MENU),
    ("MAIN_MENU", desktop::SYSTEM_MAIN_MENU, codes::KEY_MENU),
    ("APP_MENU", desktop::SYSTEM_APP_MENU, codes::KEY_PROG1),
    ("MENU_HELP", desktop::SYSTEM_MENU_HELP, codes::KEY_HELP),
    ("MENU_EXIT", desktop::SYSTEM_MENU_EXIT, codes::KEY_EXIT),
    ("MENU_SELECT", desktop::SYSTEM_MENU_SELECT, codes::KEY_SELECT),
    ("MENU_RIGHT", desktop::SYSTEM_MENU_RIGHT, codes::KEY_RIGHT),
    ("MENU_LEFT", desktop::SYSTEM_MENU_LEFT, codes::KEY_LEFT),
    ("MENU_UP", desktop::SYSTEM_MENU_UP, codes::KEY_UP),
    ("MENU_DOWN", desktop::SYSTEM_MENU_DOWN, codes::KEY_DOWN),
    ("POWER_UP", desktop::SYSTEM_POWER_UP, codes::KEY_POWER2),
    ("RESTART", desktop::SYSTEM_RESTART, codes::KEY_RESTART),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemControlProfile;

impl MapProfile for SystemControlProfile {
    fn name(&self) -> &str {
        "system-control"
    }

    fn description(&self) -> &str {
        "System Control"
    }

    fn applications(&self) -> Vec<Usage> {
        vec![usages::desktop(desktop::SYSTEM_CONTROL)]
    }

    fn table(&self) -> Vec<MapEntry> {
        SYSTEM_CONTROL_KEYS
            .iter()
            .map(|(name, usage, code)| MapEntry::key(name, usages::desktop(*usage), *code))
            .collect()
    }
}

// =============================================================================
// Pens and digitizers
// =============================================================================

fn digi_key(name: &str, usage: u16, code: u16) -> MapEntry {
    MapEntry::key(name, usages::digitizer(usage), code)
}

fn digi_abs(name: &str, usage: u16, code: u16) -> MapEntry {
    MapEntry::abs(name, usages::digitizer(usage), code)
}

fn battery() -> MapEntry {
    MapEntry::callback(
        "BATTERY_STRENGTH",
        usages::digitizer(digitizer::BATTERY_STRENGTH),
        Arc::new(BatteryStrength::new()),
    )
    .with_relabs(iichid_map::RelAbs::Absolute)
}

/// Generic digitizer (Digitizers page, Digitizer collection)
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitizerProfile;

impl MapProfile for DigitizerProfile {
    fn name(&self) -> &str {
        "digitizer"
    }

    fn description(&self) -> &str {
        "Digitizer"
    }

    fn applications(&self) -> Vec<Usage> {
        vec![usages::digitizer(digitizer::DIGITIZER)]
    }

    fn table(&self) -> Vec<MapEntry> {
        vec![
            MapEntry::abs("X", usages::desktop(desktop::X), codes::ABS_X).required(),
            MapEntry::abs("Y", usages::desktop(desktop::Y), codes::ABS_Y).required(),
            digi_abs("TIP_PRESSURE", digitizer::TIP_PRESSURE, codes::ABS_PRESSURE),
            digi_abs("X_TILT", digitizer::X_TILT, codes::ABS_TILT_X),
            digi_abs("Y_TILT", digitizer::Y_TILT, codes::ABS_TILT_Y),
            battery(),
            digi_key("TOUCH", digitizer::TOUCH, codes::BTN_TOUCH),
            digi_key("TIP_SWITCH", digitizer::TIP_SWITCH, codes::BTN_TOUCH),
            digi_key("SEC_TIP_SWITCH", digitizer::SEC_TIP_SWITCH, codes::BTN_TOUCH),
            digi_key("IN_RANGE", digitizer::IN_RANGE, codes::BTN_TOOL_PEN),
            digi_key("BARREL_SWITCH", digitizer::BARREL_SWITCH, codes::BTN_STYLUS),
            digi_key("INVERT", digitizer::INVERT, codes::BTN_TOOL_RUBBER),
            digi_key("ERASER", digitizer::ERASER, codes::BTN_TOUCH),
            digi_key("TABLET_PICK", digitizer::TABLET_PICK, codes::BTN_STYLUS2),
            digi_key("SEC_BARREL_SWITCH", digitizer::SEC_BARREL_SWITCH, codes::BTN_STYLUS2),
            MapEntry::completion("COMPLETE", Arc::new(DeclareProperty(InputProperty::Pointer))),
        ]
    }
}

/// Windows-compatible pen (Digitizers page, Pen collection)
#[derive(Debug, Clone, Copy, Default)]
pub struct PenProfile;

impl MapProfile for PenProfile {
    fn name(&self) -> &str {
        "pen"
    }

    fn description(&self) -> &str {
        "Pen"
    }

    fn applications(&self) -> Vec<Usage> {
        vec![usages::digitizer(digitizer::PEN)]
    }

    fn table(&self) -> Vec<MapEntry> {
        vec![
            MapEntry::abs("X", usages::desktop(desktop::X), codes::ABS_X).required(),
            MapEntry::abs("Y", usages::desktop(desktop::Y), codes::ABS_Y).required(),
            digi_abs("TIP_PRESSURE", digitizer::TIP_PRESSURE, codes::ABS_PRESSURE).required(),
            digi_abs("X_TILT", digitizer::X_TILT, codes::ABS_TILT_X),
            digi_abs("Y_TILT", digitizer::Y_TILT, codes::ABS_TILT_Y),
            battery(),
            digi_key("TIP_SWITCH", digitizer::TIP_SWITCH, codes::BTN_TOUCH).required(),
            digi_key("IN_RANGE", digitizer::IN_RANGE, codes::BTN_TOOL_PEN).required(),
            digi_key("BARREL_SWITCH", digitizer::BARREL_SWITCH, codes::BTN_STYLUS),
            digi_key("INVERT", digitizer::INVERT, codes::BTN_TOOL_RUBBER).required(),
            digi_key("ERASER", digitizer::ERASER, codes::BTN_TOUCH).required(),
            MapEntry::completion("COMPLETE", Arc::new(DeclareProperty(InputProperty::Direct))),
        ]
    }
}

// =============================================================================
// Mouse
// =============================================================================

/// Boot-style mouse: buttons, X/Y and wheels
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseProfile;

impl MapProfile for MouseProfile {
    fn name(&self) -> &str {
        "mouse"
    }

    fn description(&self) -> &str {
        "Mouse"
    }

    fn applications(&self) -> Vec<Usage> {
        vec![
            usages::desktop(desktop::MOUSE),
            usages::desktop(desktop::POINTER),
        ]
    }

    fn table(&self) -> Vec<MapEntry> {
        vec![
            MapEntry::key("BUTTONS", usages::button(1), codes::BTN_MOUSE).with_count(16),
            MapEntry::rel("X", usages::desktop(desktop::X), codes::REL_X).required(),
            MapEntry::rel("Y", usages::desktop(desktop::Y), codes::REL_Y).required(),
            MapEntry::rel("WHEEL", usages::desktop(desktop::WHEEL), codes::REL_WHEEL),
            MapEntry::rel("AC_PAN", usages::consumer(consumer::AC_PAN), codes::REL_HWHEEL),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iichid_map::{HidMap, InputEvent, ReportDescriptor};

    /// Pen collection, report id 2: tip/barrel/invert/eraser/in-range bits,
    /// 3 bits padding, X/Y 16-bit absolute, pressure 0..1023
    const PEN: &[u8] = &[
        0x05, 0x0D, 0x09, 0x02, 0xA1, 0x01, 0x85, 0x02, //
        0x09, 0x42, 0x09, 0x44, 0x09, 0x3C, 0x09, 0x45, 0x09, 0x32, //
        0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x05, 0x81, 0x02, //
        0x95, 0x03, 0x81, 0x03, //
        0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x26, 0xFF, 0x7F, 0x75, 0x10, 0x95, 0x02, 0x81,
        0x02, //
        0x05, 0x0D, 0x09, 0x30, 0x26, 0xFF, 0x03, 0x95, 0x01, 0x81, 0x02, //
        0xC0,
    ];

    #[test]
    fn test_system_control_table() {
        let table = SystemControlProfile.table();
        assert_eq!(table.len(), 15);
        assert_eq!(table[0].name, "POWER_DOWN");
        assert_eq!(table[14].usage, Some(usages::desktop(0x8F)));
    }

    #[test]
    fn test_pen_attach_declares_direct() {
        let rdesc = ReportDescriptor::parse(PEN);
        assert!(PenProfile.serves(&rdesc));
        assert!(!DigitizerProfile.serves(&rdesc));

        let mut map = HidMap::attach(&rdesc, PenProfile.table()).unwrap();
        let decl = map.declaration();
        assert!(decl.has_property(InputProperty::Direct));
        assert!(decl.supports(EventType::Abs, codes::ABS_PRESSURE));
        assert!(decl.supports(EventType::Key, codes::BTN_TOOL_RUBBER));
        // no battery usage in this descriptor
        assert!(!decl.supports_type(EventType::Pwr));

        // tip down, in range, X=0x1234 Y=0x0100, pressure 512
        let mut events = Vec::new();
        map.decode(&[0x02, 0b1_0001, 0x34, 0x12, 0x00, 0x01, 0x00, 0x02], &mut events);
        assert!(events.contains(&InputEvent::new(EventType::Key, codes::BTN_TOUCH, 1)));
        assert!(events.contains(&InputEvent::new(EventType::Key, codes::BTN_TOOL_PEN, 1)));
        assert!(events.contains(&InputEvent::new(EventType::Abs, codes::ABS_X, 0x1234)));
        assert!(events.contains(&InputEvent::new(EventType::Abs, codes::ABS_PRESSURE, 512)));
        assert!(events.last().unwrap().is_syn_report());
    }

    #[test]
    fn test_pen_requires_eraser() {
        // same pen without the eraser usage: the pen table refuses it
        let mut rdesc = PEN.to_vec();
        let at = rdesc.windows(2).position(|w| w == [0x09, 0x45]).unwrap();
        rdesc[at + 1] = 0x33;
        let rdesc = ReportDescriptor::parse(&rdesc);
        assert!(HidMap::attach(&rdesc, PenProfile.table()).is_err());
    }

    #[test]
    fn test_battery_strength() {
        let battery = BatteryStrength::new();
        assert_eq!(battery.level(), None);
        let mut sink = Vec::new();
        battery.invoke(Phase::Running {
            value: 80,
            sink: &mut sink,
        });
        assert_eq!(battery.level(), Some(80));
        assert!(sink.is_empty());
    }
}
