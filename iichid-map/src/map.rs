//! The mapped device: bindings plus the per-report decode loop

use iichid_transport::ReportDescriptor;
use tracing::{debug, info, trace};

use crate::binding::{self, Binding, BindingKind, Capabilities};
use crate::error::MapError;
use crate::event::{EventSink, InputDeclaration, InputEvent};
use crate::item::{CallbackStatus, MapEntry, Phase};

/// A map table resolved against one report descriptor.
///
/// Owns the array key state, so one `HidMap` serves exactly one device.
#[derive(Debug)]
pub struct HidMap {
    entries: Vec<MapEntry>,
    bindings: Vec<Binding>,
    /// Entries whose callback returned Disable
    disabled: Vec<bool>,
    capabilities: Capabilities,
    declaration: InputDeclaration,
    uses_report_ids: bool,
    debug: bool,
}

impl HidMap {
    /// Which entries of `table` the descriptor mentions, without attaching
    pub fn probe(rdesc: &ReportDescriptor, table: &[MapEntry]) -> Capabilities {
        Capabilities::probe(rdesc, table)
    }

    /// Resolve `entries` and run the Attaching phase of every callback.
    pub fn attach(rdesc: &ReportDescriptor, entries: Vec<MapEntry>) -> Result<Self, MapError> {
        for entry in &entries {
            entry.validate()?;
        }

        let capabilities = Capabilities::probe(rdesc, &entries);
        let bindings = binding::resolve(rdesc, &entries)?;
        if bindings.is_empty() {
            return Err(MapError::NothingMapped);
        }

        let mut declaration = InputDeclaration::new();
        for binding in &bindings {
            binding.declare(&mut declaration);
        }

        let mut disabled = vec![false; entries.len()];
        for (index, entry) in entries.iter().enumerate() {
            let Some(callback) = entry.callback_target() else {
                continue;
            };
            let bound = entry.is_completion()
                || bindings
                    .iter()
                    .any(|b| b.kind == BindingKind::Callback { entry: index });
            if !bound {
                continue;
            }
            if callback.invoke(Phase::Attaching(&mut declaration)) == CallbackStatus::Disable {
                debug!("{}: callback disabled while attaching", entry.name);
                disabled[index] = true;
            }
        }

        info!(
            "Mapped {} of {} entries into {} bindings (caps {})",
            capabilities.count_all(),
            entries.len(),
            bindings.len(),
            capabilities
        );

        Ok(Self {
            entries,
            bindings,
            disabled,
            capabilities,
            declaration,
            uses_report_ids: rdesc.uses_report_ids(),
            debug: false,
        })
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn declaration(&self) -> &InputDeclaration {
        &self.declaration
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Decode one input report (payload without the length prefix).
    ///
    /// Always ends with exactly one SYN_REPORT.
    pub fn decode(&mut self, report: &[u8], sink: &mut dyn EventSink) {
        let (id, data) = if self.uses_report_ids {
            match report.split_first() {
                Some((id, rest)) => (*id, rest),
                None => (0, report),
            }
        } else {
            (0, report)
        };
        if self.debug {
            debug!("Decoding report id {} ({} bytes)", id, data.len());
        }

        let Self {
            entries,
            bindings,
            disabled,
            debug,
            ..
        } = self;

        for binding in bindings.iter_mut() {
            if binding.report_id != id {
                continue;
            }
            if !binding.fits(data) {
                trace!(
                    "Report too short for bits {}..{}",
                    binding.bit_offset,
                    binding.bit_offset.saturating_add(binding.bit_size)
                );
                continue;
            }
            let value = binding.extract(data);
            if *debug {
                debug!(
                    "{} ({}) = {}",
                    entries[binding.entry].name,
                    binding.kind.name(),
                    value
                );
            }

            let key = binding.array_key(value);
            match &mut binding.kind {
                BindingKind::Variable { ty, code } | BindingKind::ArrayList { ty, code } => {
                    sink.emit(InputEvent::new(*ty, *code, value));
                }
                BindingKind::ArrayRange { ty, last_key, .. } => {
                    if key != *last_key {
                        if let Some(old) = *last_key {
                            sink.emit(InputEvent::new(*ty, old, 0));
                        }
                        if let Some(new) = key {
                            sink.emit(InputEvent::new(*ty, new, 1));
                        }
                    }
                    *last_key = key;
                }
                BindingKind::Callback { entry } => {
                    let entry = *entry;
                    run_callback(entries, disabled, entry, value, sink);
                }
            }
        }

        for index in 0..entries.len() {
            if entries[index].is_completion() {
                run_callback(entries, disabled, index, 0, sink);
            }
        }

        sink.emit(InputEvent::syn_report());
    }

    /// Run the Detaching phase of every callback still enabled.
    pub fn detach(&mut self) {
        for (index, entry) in self.entries.iter().enumerate() {
            if self.disabled[index] {
                continue;
            }
            let bound = entry.is_completion()
                || self
                    .bindings
                    .iter()
                    .any(|b| b.kind == BindingKind::Callback { entry: index });
            if let (true, Some(callback)) = (bound, entry.callback_target()) {
                callback.invoke(Phase::Detaching);
            }
        }
        self.disabled.iter_mut().for_each(|d| *d = true);
        debug!("Map detached");
    }
}

fn run_callback(
    entries: &[MapEntry],
    disabled: &mut [bool],
    index: usize,
    value: i32,
    sink: &mut dyn EventSink,
) {
    if disabled[index] {
        return;
    }
    let Some(callback) = entries[index].callback_target() else {
        return;
    };
    if callback.invoke(Phase::Running { value, sink }) == CallbackStatus::Disable {
        debug!("{}: callback disabled", entries[index].name);
        disabled[index] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{codes, EventType, InputProperty};
    use crate::usages::{self, desktop};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Mouse with report id 1: 3 buttons, 5 bits padding, X/Y rel 8-bit, wheel
    const MOUSE: &[u8] = &[
        0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x85, 0x01, //
        0x05, 0x09, 0x19, 0x01, 0x29, 0x03, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x03,
        0x81, 0x02, //
        0x75, 0x05, 0x95, 0x01, 0x81, 0x01, //
        0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x09, 0x38, 0x15, 0x81, 0x25, 0x7F, 0x75, 0x08,
        0x95, 0x03, 0x81, 0x06, //
        0xC0,
    ];

    fn mouse_table() -> Vec<MapEntry> {
        vec![
            MapEntry::key("BUTTONS", usages::button(1), codes::BTN_MOUSE).with_count(16),
            MapEntry::rel("X", usages::desktop(desktop::X), codes::REL_X).required(),
            MapEntry::rel("Y", usages::desktop(desktop::Y), codes::REL_Y).required(),
            MapEntry::rel("WHEEL", usages::desktop(desktop::WHEEL), codes::REL_WHEEL),
        ]
    }

    #[test]
    fn test_mouse_decode() {
        let rdesc = ReportDescriptor::parse(MOUSE);
        let mut map = HidMap::attach(&rdesc, mouse_table()).unwrap();
        assert_eq!(map.bindings().len(), 6);

        let mut events = Vec::new();
        map.decode(&[0x01, 0b101, 0x05, 0xFE, 0x01], &mut events);
        assert_eq!(
            events,
            vec![
                InputEvent::new(EventType::Key, codes::BTN_LEFT, 1),
                InputEvent::new(EventType::Key, codes::BTN_RIGHT, 0),
                InputEvent::new(EventType::Key, codes::BTN_MIDDLE, 1),
                InputEvent::new(EventType::Rel, codes::REL_X, 5),
                InputEvent::new(EventType::Rel, codes::REL_Y, -2),
                InputEvent::new(EventType::Rel, codes::REL_WHEEL, 1),
                InputEvent::syn_report(),
            ]
        );
    }

    #[test]
    fn test_other_report_id_only_syncs() {
        let rdesc = ReportDescriptor::parse(MOUSE);
        let mut map = HidMap::attach(&rdesc, mouse_table()).unwrap();
        let mut events = Vec::new();
        map.decode(&[0x02, 0xFF, 0xFF, 0xFF, 0xFF], &mut events);
        assert_eq!(events, vec![InputEvent::syn_report()]);
    }

    #[test]
    fn test_relabs_conflict_is_unresolved() {
        let rdesc = ReportDescriptor::parse(MOUSE);
        let table = vec![MapEntry::abs("X", usages::desktop(desktop::X), codes::ABS_X).required()];
        match HidMap::attach(&rdesc, table) {
            Err(MapError::MissingCapability { name, .. }) => assert_eq!(name, "X"),
            other => panic!("Expected MissingCapability, got {:?}", other.map(|_| ())),
        }

        // optional: dropped, but the capability bit stays set
        let table = vec![
            MapEntry::abs("X", usages::desktop(desktop::X), codes::ABS_X),
            MapEntry::rel("Y", usages::desktop(desktop::Y), codes::REL_Y),
        ];
        let map = HidMap::attach(&rdesc, table).unwrap();
        assert_eq!(map.bindings().len(), 1);
        assert!(map.capabilities().test(0));
    }

    #[test]
    fn test_nothing_mapped() {
        let rdesc = ReportDescriptor::parse(MOUSE);
        let table = vec![MapEntry::abs(
            "PRESSURE",
            usages::digitizer(usages::digitizer::TIP_PRESSURE),
            codes::ABS_PRESSURE,
        )];
        assert!(matches!(
            HidMap::attach(&rdesc, table),
            Err(MapError::NothingMapped)
        ));
    }

    #[test]
    fn test_declaration() {
        let rdesc = ReportDescriptor::parse(MOUSE);
        let map = HidMap::attach(&rdesc, mouse_table()).unwrap();
        let decl = map.declaration();
        assert!(decl.supports(EventType::Key, codes::BTN_MIDDLE));
        assert!(!decl.supports(EventType::Key, codes::BTN_MIDDLE + 1));
        assert!(decl.supports(EventType::Rel, codes::REL_WHEEL));
        assert!(!decl.supports_type(EventType::Abs));
    }

    #[test]
    fn test_callback_phases() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let wheel = move |phase: Phase<'_>| {
            match phase {
                Phase::Attaching(decl) => {
                    decl.support_property(InputProperty::Pointer);
                    seen.lock().push("attach".into());
                }
                Phase::Running { value, sink } => {
                    sink.emit(InputEvent::new(EventType::Rel, codes::REL_HWHEEL, value));
                    seen.lock().push(format!("run {value}"));
                }
                Phase::Detaching => seen.lock().push("detach".into()),
            }
            CallbackStatus::Continue
        };

        let rdesc = ReportDescriptor::parse(MOUSE);
        let mut table = mouse_table();
        table[3] = MapEntry::callback("WHEEL", usages::desktop(desktop::WHEEL), Arc::new(wheel));
        let mut map = HidMap::attach(&rdesc, table).unwrap();
        assert!(map.declaration().has_property(InputProperty::Pointer));

        let mut events = Vec::new();
        map.decode(&[0x01, 0, 0, 0, 0xFF], &mut events);
        assert!(events.contains(&InputEvent::new(EventType::Rel, codes::REL_HWHEEL, -1)));
        map.detach();

        assert_eq!(*log.lock(), vec!["attach", "run -1", "detach"]);
    }

    #[test]
    fn test_completion_disable_skips_running_and_detaching() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let complete = move |phase: Phase<'_>| {
            *counter.lock() += 1;
            if let Phase::Attaching(decl) = phase {
                decl.support_property(InputProperty::Direct);
            }
            CallbackStatus::Disable
        };

        let rdesc = ReportDescriptor::parse(MOUSE);
        let mut table = mouse_table();
        table.push(MapEntry::completion("COMPL", Arc::new(complete)));
        let mut map = HidMap::attach(&rdesc, table).unwrap();
        assert!(map.declaration().has_property(InputProperty::Direct));
        assert!(!map.capabilities().test(4));

        let mut events = Vec::new();
        map.decode(&[0x01, 0, 0, 0, 0], &mut events);
        map.detach();
        assert_eq!(*calls.lock(), 1);
        assert!(events.last().unwrap().is_syn_report());
    }
}
