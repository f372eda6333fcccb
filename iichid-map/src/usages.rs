//! HID usage tables (HUT 1.12) used by the built-in maps

use iichid_transport::Usage;

pub mod page {
    pub const GENERIC_DESKTOP: u16 = 0x01;
    pub const KEYBOARD: u16 = 0x07;
    pub const BUTTON: u16 = 0x09;
    pub const CONSUMER: u16 = 0x0C;
    pub const DIGITIZERS: u16 = 0x0D;
}

/// Generic Desktop page
pub mod desktop {
    pub const POINTER: u16 = 0x01;
    pub const MOUSE: u16 = 0x02;
    pub const KEYBOARD: u16 = 0x06;
    pub const X: u16 = 0x30;
    pub const Y: u16 = 0x31;
    pub const WHEEL: u16 = 0x38;
    pub const SYSTEM_CONTROL: u16 = 0x80;
    pub const SYSTEM_POWER_DOWN: u16 = 0x81;
    pub const SYSTEM_SLEEP: u16 = 0x82;
    pub const SYSTEM_WAKEUP: u16 = 0x83;
    pub const SYSTEM_CONTEXT_MENU: u16 = 0x84;
    pub const SYSTEM_MAIN_MENU: u16 = 0x85;
    pub const SYSTEM_APP_MENU: u16 = 0x86;
    pub const SYSTEM_MENU_HELP: u16 = 0x87;
    pub const SYSTEM_MENU_EXIT: u16 = 0x88;
    pub const SYSTEM_MENU_SELECT: u16 = 0x89;
    pub const SYSTEM_MENU_RIGHT: u16 = 0x8A;
    pub const SYSTEM_MENU_LEFT: u16 = 0x8B;
    pub const SYSTEM_MENU_UP: u16 = 0x8C;
    pub const SYSTEM_MENU_DOWN: u16 = 0x8D;
    pub const SYSTEM_POWER_UP: u16 = 0x8E;
    pub const SYSTEM_RESTART: u16 = 0x8F;
}

/// Consumer page
pub mod consumer {
    pub const AC_PAN: u16 = 0x0238;
}

/// Digitizers page
pub mod digitizer {
    pub const DIGITIZER: u16 = 0x01;
    pub const PEN: u16 = 0x02;
    pub const TOUCH_SCREEN: u16 = 0x04;
    pub const TOUCHPAD: u16 = 0x05;
    pub const STYLUS: u16 = 0x20;
    pub const TIP_PRESSURE: u16 = 0x30;
    pub const IN_RANGE: u16 = 0x32;
    pub const TOUCH: u16 = 0x33;
    pub const BATTERY_STRENGTH: u16 = 0x3B;
    pub const INVERT: u16 = 0x3C;
    pub const X_TILT: u16 = 0x3D;
    pub const Y_TILT: u16 = 0x3E;
    pub const TIP_SWITCH: u16 = 0x42;
    pub const SEC_TIP_SWITCH: u16 = 0x43;
    pub const BARREL_SWITCH: u16 = 0x44;
    pub const ERASER: u16 = 0x45;
    pub const TABLET_PICK: u16 = 0x46;
    pub const SEC_BARREL_SWITCH: u16 = 0x5A;
}

pub const fn desktop(id: u16) -> Usage {
    Usage::new(page::GENERIC_DESKTOP, id)
}

pub const fn digitizer(id: u16) -> Usage {
    Usage::new(page::DIGITIZERS, id)
}

pub const fn button(n: u16) -> Usage {
    Usage::new(page::BUTTON, n)
}

pub const fn consumer(id: u16) -> Usage {
    Usage::new(page::CONSUMER, id)
}

/// Page name for diagnostics
pub fn page_name(page: u16) -> &'static str {
    match page {
        page::GENERIC_DESKTOP => "Generic Desktop",
        page::KEYBOARD => "Keyboard",
        page::BUTTON => "Button",
        page::CONSUMER => "Consumer",
        page::DIGITIZERS => "Digitizers",
        0xFF00..=0xFFFF => "Vendor",
        _ => "Unknown",
    }
}
