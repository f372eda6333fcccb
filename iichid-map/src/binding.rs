//! Resolving a map table against a report descriptor
//!
//! Each entry is matched against the input fields in three passes: variable
//! fields, then arrays listing their usages, then arrays declaring a usage
//! range. The first structural match wins; if its relative/absolute flag
//! disagrees with the entry, the entry stays unresolved.

use std::fmt;

use iichid_transport::rdesc::slot_index;
use iichid_transport::{Field, ReportDescriptor, Usage, UsageRange};
use tracing::{debug, trace};

use crate::error::MapError;
use crate::event::{EventType, InputDeclaration};
use crate::item::{MapEntry, Target};

/// Run of consecutive array usages mapped onto consecutive key codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRun {
    pub first: Usage,
    pub count: u16,
    pub code: u16,
}

impl KeyRun {
    fn key_for(&self, usage: Usage) -> Option<u16> {
        if usage.page != self.first.page || usage.id < self.first.id {
            return None;
        }
        let delta = usage.id - self.first.id;
        if delta >= self.count {
            return None;
        }
        self.code.checked_add(delta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// One variable slot reporting one usage
    Variable { ty: EventType, code: u16 },
    /// Array listing its usages; the first slot is reported as is
    ArrayList { ty: EventType, code: u16 },
    /// Array selecting a usage out of a range: a key that is held until the
    /// selection changes
    ArrayRange {
        ty: EventType,
        logical_min: i32,
        logical_max: i32,
        range: UsageRange,
        runs: Vec<KeyRun>,
        last_key: Option<u16>,
    },
    /// Value goes to the callback of map entry `entry`
    Callback { entry: usize },
}

impl BindingKind {
    pub fn name(&self) -> &'static str {
        match self {
            BindingKind::Variable { .. } => "variable",
            BindingKind::ArrayList { .. } => "array-list",
            BindingKind::ArrayRange { .. } => "array-range",
            BindingKind::Callback { .. } => "callback",
        }
    }
}

/// A map entry tied to a concrete location in the input reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Index of the map entry that produced this binding
    pub entry: usize,
    pub report_id: u8,
    pub bit_offset: u32,
    pub bit_size: u32,
    pub signed: bool,
    pub kind: BindingKind,
}

impl Binding {
    fn at_slot(entry: usize, field: &Field, slot: u32, kind: BindingKind) -> Self {
        Self {
            entry,
            report_id: field.report_id,
            bit_offset: field.slot_offset(slot),
            bit_size: field.bit_size,
            signed: field.is_signed(),
            kind,
        }
    }

    /// Whether `data` (report bytes after the id) holds this binding's bits
    pub fn fits(&self, data: &[u8]) -> bool {
        let end = self.bit_offset as usize + self.bit_size as usize;
        end <= data.len() * 8
    }

    pub fn extract(&self, data: &[u8]) -> i32 {
        extract(data, self.bit_offset, self.bit_size, self.signed)
    }

    /// Key code selected by an array value, None for "nothing pressed"
    pub(crate) fn array_key(&self, value: i32) -> Option<u16> {
        let BindingKind::ArrayRange {
            logical_min,
            logical_max,
            range,
            runs,
            ..
        } = &self.kind
        else {
            return None;
        };
        if value < *logical_min || value > *logical_max {
            return None;
        }
        let usage = range.nth(slot_index(value, *logical_min)?)?;
        runs.iter().find_map(|run| run.key_for(usage))
    }

    /// Record what this binding can emit
    pub fn declare(&self, declaration: &mut InputDeclaration) {
        match &self.kind {
            BindingKind::Variable { ty, code } | BindingKind::ArrayList { ty, code } => {
                declaration.support_event(*ty, *code)
            }
            BindingKind::ArrayRange { ty, runs, .. } => {
                for run in runs {
                    for code in (0..run.count).filter_map(|delta| run.code.checked_add(delta)) {
                        declaration.support_event(*ty, code);
                    }
                }
            }
            BindingKind::Callback { .. } => {}
        }
    }
}

/// Read `size` bits at `offset` (little-endian bit order), sign-extending
/// when `signed`. Bits past the end of `data` read as zero.
pub fn extract(data: &[u8], offset: u32, size: u32, signed: bool) -> i32 {
    let size = size.min(32);
    if size == 0 {
        return 0;
    }
    let first = (offset / 8) as usize;
    let shift = offset % 8;
    let nbytes = ((shift + size + 7) / 8) as usize;

    let mut acc: u64 = 0;
    for (n, byte) in data.iter().skip(first).take(nbytes).enumerate() {
        acc |= (*byte as u64) << (8 * n);
    }
    let raw = ((acc >> shift) & ((1u64 << size) - 1)) as u32;

    if signed && size < 32 && raw & (1 << (size - 1)) != 0 {
        (raw | !((1u32 << size) - 1)) as i32
    } else {
        raw as i32
    }
}

/// One bit per map entry: the entry's usage appears in some input field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    bits: Vec<bool>,
}

impl Capabilities {
    /// Pure function of the descriptor and the table
    pub fn probe(rdesc: &ReportDescriptor, table: &[MapEntry]) -> Self {
        let bits = table
            .iter()
            .map(|entry| match entry.usage_range() {
                Some(range) => rdesc
                    .input_fields()
                    .any(|field| (0..range.len()).filter_map(|i| range.nth(i)).any(|u| field.mentions(u))),
                None => false,
            })
            .collect();
        Self { bits }
    }

    pub fn test(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    /// Set bits in `first..=last`
    pub fn count(&self, first: usize, last: usize) -> usize {
        self.bits
            .iter()
            .enumerate()
            .filter(|(i, set)| **set && *i >= first && *i <= last)
            .count()
    }

    pub fn count_all(&self) -> usize {
        self.bits.iter().filter(|set| **set).count()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for set in &self.bits {
            f.write_str(if *set { "1" } else { "0" })?;
        }
        Ok(())
    }
}

enum Match<'a> {
    Variable(&'a Field, Vec<(u32, Usage)>),
    ArrayList(&'a Field, Usage),
    ArrayRange(&'a Field, UsageRange),
}

impl Match<'_> {
    fn field(&self) -> &Field {
        match self {
            Match::Variable(f, _) | Match::ArrayList(f, _) | Match::ArrayRange(f, _) => f,
        }
    }
}

fn find_match<'a>(fields: &[&'a Field], range: UsageRange) -> Option<Match<'a>> {
    for field in fields.iter().filter(|f| f.is_variable()) {
        // slots past the last usage repeat it; only the first one counts
        let mut seen: Vec<Usage> = Vec::new();
        let slots: Vec<(u32, Usage)> = (0..field.count)
            .filter_map(|slot| field.usage_at(slot).map(|u| (slot, u)))
            .filter(|(_, u)| range.contains(*u))
            .filter(|(_, u)| {
                if seen.contains(u) {
                    return false;
                }
                seen.push(*u);
                true
            })
            .collect();
        if !slots.is_empty() {
            return Some(Match::Variable(field, slots));
        }
    }

    for field in fields.iter().filter(|f| f.is_array() && !f.usages.is_empty()) {
        if let Some(usage) = field.usages.iter().find(|u| range.contains(**u)) {
            return Some(Match::ArrayList(field, *usage));
        }
    }

    for field in fields.iter().filter(|f| f.is_array() && f.usages.is_empty()) {
        let Some(field_range) = field.usage_range else {
            continue;
        };
        if field_range.min.page != range.min.page {
            continue;
        }
        let lo = field_range.min.id.max(range.min.id);
        let hi = field_range.max.id.min(range.max.id);
        if lo <= hi {
            return Some(Match::ArrayRange(
                field,
                UsageRange {
                    min: Usage::new(range.min.page, lo),
                    max: Usage::new(range.min.page, hi),
                },
            ));
        }
    }

    None
}

/// Resolve every entry of `table` into bindings.
///
/// Unresolved optional entries are dropped; an unresolved required entry
/// fails the whole table.
pub fn resolve(rdesc: &ReportDescriptor, table: &[MapEntry]) -> Result<Vec<Binding>, MapError> {
    let fields: Vec<&Field> = rdesc.input_fields().collect();
    let mut bindings: Vec<Binding> = Vec::new();

    for (index, entry) in table.iter().enumerate() {
        let Some(range) = entry.usage_range() else {
            continue;
        };

        let found = find_match(&fields, range)
            .filter(|m| {
                let relative = m.field().is_relative();
                let ok = entry.relabs.accepts(relative);
                if !ok {
                    debug!(
                        "{}: field is {}, map wants {:?}",
                        entry.name,
                        if relative { "relative" } else { "absolute" },
                        entry.relabs
                    );
                }
                ok
            });

        let Some(found) = found else {
            if entry.required {
                return Err(MapError::MissingCapability {
                    name: entry.name.clone(),
                    usage: range.min.to_string(),
                });
            }
            trace!("{}: no match for {}", entry.name, range.min);
            continue;
        };

        match (found, &entry.target) {
            (Match::Variable(field, slots), Target::Event { ty, .. }) => {
                for (slot, usage) in slots {
                    let Some(code) = entry.code_for(usage) else {
                        continue;
                    };
                    bindings.push(Binding::at_slot(
                        index,
                        field,
                        slot,
                        BindingKind::Variable { ty: *ty, code },
                    ));
                }
            }
            (Match::Variable(field, slots), Target::Callback(_)) => {
                if let Some((slot, _)) = slots.first() {
                    bindings.push(Binding::at_slot(
                        index,
                        field,
                        *slot,
                        BindingKind::Callback { entry: index },
                    ));
                }
            }
            (Match::ArrayList(field, usage), Target::Event { ty, .. }) => {
                if let Some(code) = entry.code_for(usage) {
                    bindings.push(Binding::at_slot(
                        index,
                        field,
                        0,
                        BindingKind::ArrayList { ty: *ty, code },
                    ));
                }
            }
            (Match::ArrayRange(field, overlap), Target::Event { ty, .. }) => {
                let Some(code) = entry.code_for(overlap.min) else {
                    continue;
                };
                let run = KeyRun {
                    first: overlap.min,
                    count: overlap.len() as u16,
                    code,
                };
                let offset = field.slot_offset(0);
                // entries sharing one array slot share its pressed key
                let existing = bindings.iter_mut().find(|b| {
                    b.report_id == field.report_id
                        && b.bit_offset == offset
                        && matches!(b.kind, BindingKind::ArrayRange { .. })
                });
                match existing {
                    Some(Binding {
                        kind: BindingKind::ArrayRange { runs, .. },
                        ..
                    }) => runs.push(run),
                    _ => {
                        let Some(field_range) = field.usage_range else {
                            continue;
                        };
                        bindings.push(Binding::at_slot(
                            index,
                            field,
                            0,
                            BindingKind::ArrayRange {
                                ty: *ty,
                                logical_min: field.logical_min,
                                logical_max: field.logical_max,
                                range: field_range,
                                runs: vec![run],
                                last_key: None,
                            },
                        ))
                    }
                }
            }
            (Match::ArrayList(field, _) | Match::ArrayRange(field, _), Target::Callback(_)) => {
                bindings.push(Binding::at_slot(
                    index,
                    field,
                    0,
                    BindingKind::Callback { entry: index },
                ));
            }
        }
    }

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::codes;
    use crate::usages;

    #[test]
    fn test_extract_unsigned() {
        let data = [0b1010_1100, 0b0000_0011];
        assert_eq!(extract(&data, 0, 1, false), 0);
        assert_eq!(extract(&data, 2, 2, false), 0b11);
        assert_eq!(extract(&data, 4, 8, false), 0b0011_1010);
        assert_eq!(extract(&data, 0, 16, false), 0x03AC);
    }

    #[test]
    fn test_extract_signed() {
        assert_eq!(extract(&[0xFB], 0, 8, true), -5);
        assert_eq!(extract(&[0xFB], 0, 8, false), 0xFB);
        // 12-bit value straddling bytes: 0x800 is the minimum
        assert_eq!(extract(&[0x00, 0x08], 0, 12, true), -2048);
        assert_eq!(extract(&[0xFF, 0xFF, 0xFF, 0xFF], 0, 32, true), -1);
    }

    #[test]
    fn test_extract_past_end_reads_zero() {
        assert_eq!(extract(&[0xFF], 4, 8, false), 0x0F);
        assert_eq!(extract(&[], 0, 8, false), 0);
    }

    #[test]
    fn test_key_run() {
        let run = KeyRun {
            first: usages::desktop(0x81),
            count: 3,
            code: codes::KEY_POWER,
        };
        assert_eq!(run.key_for(usages::desktop(0x81)), Some(codes::KEY_POWER));
        assert_eq!(run.key_for(usages::desktop(0x83)), Some(codes::KEY_POWER + 2));
        assert_eq!(run.key_for(usages::desktop(0x84)), None);
        assert_eq!(run.key_for(usages::button(0x81)), None);
    }

    #[test]
    fn test_capabilities_display() {
        let caps = Capabilities {
            bits: vec![true, false, true],
        };
        assert_eq!(caps.to_string(), "101");
        assert_eq!(caps.count(1, 2), 1);
        assert_eq!(caps.count_all(), 2);
        assert!(!caps.test(7));
    }
}
