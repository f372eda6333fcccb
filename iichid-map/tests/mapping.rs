//! Decode behavior of resolved maps on real-world descriptor shapes

use iichid_map::usages::{self, desktop};
use iichid_map::{codes, BindingKind, EventType, HidMap, InputEvent, MapEntry};
use iichid_transport::ReportDescriptor;

/// System control TLC, report id 3: one 2-bit array slot selecting
/// Power Down / Sleep / Wake Up, 6 bits padding
const SYSTEM_CONTROL: &[u8] = &[
    0x05, 0x01, 0x09, 0x80, 0xA1, 0x01, 0x85, 0x03, //
    0x19, 0x81, 0x29, 0x83, 0x15, 0x01, 0x25, 0x03, 0x75, 0x02, 0x95, 0x01, 0x81, 0x00, //
    0x75, 0x06, 0x81, 0x03, //
    0xC0,
];

/// Array listing its two usages, no report ids
const LISTED: &[u8] = &[
    0x05, 0x01, 0x09, 0x80, 0xA1, 0x01, //
    0x09, 0x82, 0x09, 0x83, 0x15, 0x00, 0x25, 0x01, 0x75, 0x08, 0x95, 0x01, 0x81, 0x00, //
    0xC0,
];

fn system_table() -> Vec<MapEntry> {
    vec![
        MapEntry::key("POWER_DOWN", usages::desktop(desktop::SYSTEM_POWER_DOWN), codes::KEY_POWER),
        MapEntry::key("SLEEP", usages::desktop(desktop::SYSTEM_SLEEP), codes::KEY_SLEEP),
        MapEntry::key("WAKEUP", usages::desktop(desktop::SYSTEM_WAKEUP), codes::KEY_WAKEUP),
        MapEntry::key(
            "CONTEXT_MENU",
            usages::desktop(desktop::SYSTEM_CONTEXT_MENU),
            codes::KEY_CONTEXT_MENU,
        ),
    ]
}

fn key(code: u16, value: i32) -> InputEvent {
    InputEvent::new(EventType::Key, code, value)
}

fn decode(map: &mut HidMap, report: &[u8]) -> Vec<InputEvent> {
    let mut events = Vec::new();
    map.decode(report, &mut events);
    events
}

#[test]
fn test_array_range_release_before_press() {
    let rdesc = ReportDescriptor::parse(SYSTEM_CONTROL);
    let mut map = HidMap::attach(&rdesc, system_table()).unwrap();

    // all three entries share the one array slot
    assert_eq!(map.bindings().len(), 1);
    assert!(matches!(
        map.bindings()[0].kind,
        BindingKind::ArrayRange { last_key: None, .. }
    ));

    assert_eq!(
        decode(&mut map, &[0x03, 0x02]),
        vec![key(codes::KEY_SLEEP, 1), InputEvent::syn_report()]
    );
    assert_eq!(
        decode(&mut map, &[0x03, 0x03]),
        vec![
            key(codes::KEY_SLEEP, 0),
            key(codes::KEY_WAKEUP, 1),
            InputEvent::syn_report()
        ]
    );
    // back to a lower usage: still release first
    assert_eq!(
        decode(&mut map, &[0x03, 0x01]),
        vec![
            key(codes::KEY_WAKEUP, 0),
            key(codes::KEY_POWER, 1),
            InputEvent::syn_report()
        ]
    );
    // held key: nothing but the sync
    assert_eq!(
        decode(&mut map, &[0x03, 0x01]),
        vec![InputEvent::syn_report()]
    );
    // zero is outside the logical range: no key pressed
    assert_eq!(
        decode(&mut map, &[0x03, 0x00]),
        vec![key(codes::KEY_POWER, 0), InputEvent::syn_report()]
    );
    assert_eq!(decode(&mut map, &[0x03, 0x00]), vec![InputEvent::syn_report()]);
}

#[test]
fn test_padding_bits_ignored() {
    let rdesc = ReportDescriptor::parse(SYSTEM_CONTROL);
    let mut map = HidMap::attach(&rdesc, system_table()).unwrap();
    assert_eq!(
        decode(&mut map, &[0x03, 0xFE]),
        vec![key(codes::KEY_SLEEP, 1), InputEvent::syn_report()]
    );
}

#[test]
fn test_capabilities_are_deterministic() {
    let table = system_table();
    let first = HidMap::probe(&ReportDescriptor::parse(SYSTEM_CONTROL), &table);
    let second = HidMap::probe(&ReportDescriptor::parse(SYSTEM_CONTROL), &table);
    assert_eq!(first, second);
    assert_eq!(first.to_string(), "1110");

    let map = HidMap::attach(&ReportDescriptor::parse(SYSTEM_CONTROL), system_table()).unwrap();
    assert_eq!(map.capabilities(), &first);
    assert_eq!(map.capabilities().count(0, 2), 3);
}

#[test]
fn test_array_range_declares_keys() {
    let rdesc = ReportDescriptor::parse(SYSTEM_CONTROL);
    let map = HidMap::attach(&rdesc, system_table()).unwrap();
    let decl = map.declaration();
    assert!(decl.supports(EventType::Key, codes::KEY_POWER));
    assert!(decl.supports(EventType::Key, codes::KEY_WAKEUP));
    assert!(!decl.supports(EventType::Key, codes::KEY_CONTEXT_MENU));
}

#[test]
fn test_array_list_reports_slot_value() {
    let rdesc = ReportDescriptor::parse(LISTED);
    let table = vec![MapEntry::key(
        "SLEEP",
        usages::desktop(desktop::SYSTEM_SLEEP),
        codes::KEY_SLEEP,
    )];
    let mut map = HidMap::attach(&rdesc, table).unwrap();
    assert!(matches!(
        map.bindings()[0].kind,
        BindingKind::ArrayList { .. }
    ));
    assert_eq!(
        decode(&mut map, &[0x01]),
        vec![key(codes::KEY_SLEEP, 1), InputEvent::syn_report()]
    );
}

/// 32-bit array spanning the whole i32 logical range over Power Down..Wake Up
const WIDE_ARRAY: &[u8] = &[
    0x05, 0x01, 0x09, 0x80, 0xA1, 0x01, //
    0x19, 0x81, 0x29, 0x83, //
    0x17, 0x00, 0x00, 0x00, 0x80, // Logical Minimum (i32::MIN)
    0x27, 0xFF, 0xFF, 0xFF, 0x7F, // Logical Maximum (i32::MAX)
    0x75, 0x20, 0x95, 0x01, 0x81, 0x00, //
    0xC0,
];

#[test]
fn test_extreme_logical_range_decodes() {
    let rdesc = ReportDescriptor::parse(WIDE_ARRAY);
    let mut map = HidMap::attach(&rdesc, system_table()).unwrap();

    // far past the usage range: nothing selected
    assert_eq!(decode(&mut map, &[5, 0, 0, 0]), vec![InputEvent::syn_report()]);
    assert_eq!(
        decode(&mut map, &[0xFF, 0xFF, 0xFF, 0x7F]),
        vec![InputEvent::syn_report()]
    );
    // i32::MIN + 2 selects the third usage
    assert_eq!(
        decode(&mut map, &[0x02, 0x00, 0x00, 0x80]),
        vec![key(codes::KEY_WAKEUP, 1), InputEvent::syn_report()]
    );
}

#[test]
fn test_oversized_field_does_not_break_attach() {
    // a Report Size/Count pair overflowing 32 bits, then the system control array
    let mut bytes = vec![
        0x05, 0x01, 0x09, 0x80, 0xA1, 0x01, 0x85, 0x03, //
        0x77, 0x00, 0x00, 0x01, 0x00, 0x97, 0x00, 0x00, 0x01, 0x00, 0x81, 0x03,
    ];
    bytes.extend_from_slice(&SYSTEM_CONTROL[8..]);
    let rdesc = ReportDescriptor::parse(&bytes);
    assert_eq!(rdesc.input_report_size(), 2);

    let mut map = HidMap::attach(&rdesc, system_table()).unwrap();
    assert_eq!(
        decode(&mut map, &[0x03, 0x02]),
        vec![key(codes::KEY_SLEEP, 1), InputEvent::syn_report()]
    );
}
