//! HID report descriptor parsing
//!
//! Walks the short-item grammar of a report descriptor and flattens every
//! main item into a [`Field`] with its report id, bit position and usages.
//! Parsing never fails: malformed tails are logged and ignored, matching how
//! devices with slightly broken descriptors are handled in practice.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// A (page, id) pair naming the meaning of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Usage {
    pub page: u16,
    pub id: u16,
}

impl Usage {
    pub const fn new(page: u16, id: u16) -> Self {
        Self { page, id }
    }

    /// Split an extended 32-bit usage (page in the high half)
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            page: (raw >> 16) as u16,
            id: raw as u16,
        }
    }

    pub const fn raw(&self) -> u32 {
        ((self.page as u32) << 16) | self.id as u32
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.page, self.id)
    }
}

/// Inclusive usage range declared with Usage Minimum / Usage Maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRange {
    pub min: Usage,
    pub max: Usage,
}

impl UsageRange {
    pub fn contains(&self, usage: Usage) -> bool {
        usage.page == self.min.page && usage.id >= self.min.id && usage.id <= self.max.id
    }

    /// Usage at `index` positions past the minimum, if still in range
    pub fn nth(&self, index: u32) -> Option<Usage> {
        let id = (self.min.id as u32).checked_add(index)?;
        (id <= self.max.id as u32).then(|| Usage::new(self.min.page, id as u16))
    }

    pub fn len(&self) -> u32 {
        (self.max.id as u32 + 1).saturating_sub(self.min.id as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which report a main item contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportKind {
    Input,
    Output,
    Feature,
}

/// Data flags of an Input/Output/Feature item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MainFlags(pub u32);

impl MainFlags {
    pub const CONSTANT: u32 = 1 << 0;
    pub const VARIABLE: u32 = 1 << 1;
    pub const RELATIVE: u32 = 1 << 2;
    pub const WRAP: u32 = 1 << 3;
    pub const NON_LINEAR: u32 = 1 << 4;
    pub const NO_PREFERRED: u32 = 1 << 5;
    pub const NULL_STATE: u32 = 1 << 6;

    pub fn is_constant(&self) -> bool {
        self.0 & Self::CONSTANT != 0
    }

    /// Variable (one usage per slot) as opposed to array (slots select usages)
    pub fn is_variable(&self) -> bool {
        self.0 & Self::VARIABLE != 0
    }

    pub fn is_relative(&self) -> bool {
        self.0 & Self::RELATIVE != 0
    }

    pub fn has_null_state(&self) -> bool {
        self.0 & Self::NULL_STATE != 0
    }
}

/// One main item after global/local state has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub kind: ReportKind,
    /// 0 when the descriptor does not use report ids
    pub report_id: u8,
    /// Offset of the first slot from the start of the report data (after the id byte)
    pub bit_offset: u32,
    /// Report Size: bits per slot
    pub bit_size: u32,
    /// Report Count: number of slots
    pub count: u32,
    pub flags: MainFlags,
    pub logical_min: i32,
    pub logical_max: i32,
    /// Usages listed one by one, in declaration order
    pub usages: Vec<Usage>,
    pub usage_range: Option<UsageRange>,
    /// Top-level application collection enclosing this field
    pub application: Option<Usage>,
}

impl Field {
    pub fn is_variable(&self) -> bool {
        self.flags.is_variable()
    }

    pub fn is_array(&self) -> bool {
        !self.flags.is_variable()
    }

    pub fn is_constant(&self) -> bool {
        self.flags.is_constant()
    }

    pub fn is_relative(&self) -> bool {
        self.flags.is_relative()
    }

    /// Values may be negative when the logical minimum is
    pub fn is_signed(&self) -> bool {
        self.logical_min < 0
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_size.saturating_mul(self.count)
    }

    /// Bit offset of slot `index`
    pub fn slot_offset(&self, index: u32) -> u32 {
        self.bit_offset
            .saturating_add(index.saturating_mul(self.bit_size))
    }

    /// Usage reported by variable slot `index`.
    ///
    /// Explicit usages are consumed first, the last one repeating; then the
    /// usage range is walked and clamped at its maximum.
    pub fn usage_at(&self, index: u32) -> Option<Usage> {
        if !self.usages.is_empty() {
            let i = (index as usize).min(self.usages.len() - 1);
            return self.usages.get(i).copied();
        }
        let range = self.usage_range?;
        range.nth(index).or(Some(range.max))
    }

    /// Whether `usage` is declared anywhere on this field
    pub fn mentions(&self, usage: Usage) -> bool {
        self.usages.contains(&usage) || self.usage_range.is_some_and(|r| r.contains(usage))
    }

    /// Usage selected by an array slot holding `value`; None for the null
    /// selection or values outside the logical range.
    pub fn array_usage(&self, value: i32) -> Option<Usage> {
        if value < self.logical_min || value > self.logical_max {
            return None;
        }
        let index = slot_index(value, self.logical_min)?;
        if !self.usages.is_empty() {
            return self.usages.get(index as usize).copied();
        }
        self.usage_range.and_then(|r| r.nth(index))
    }
}

/// Position of an array value past the logical minimum
pub fn slot_index(value: i32, logical_min: i32) -> Option<u32> {
    u32::try_from(i64::from(value) - i64::from(logical_min)).ok()
}

// =============================================================================
// Item grammar
// =============================================================================

mod tag {
    // Main
    pub const INPUT: u8 = 0x8;
    pub const OUTPUT: u8 = 0x9;
    pub const COLLECTION: u8 = 0xA;
    pub const FEATURE: u8 = 0xB;
    pub const END_COLLECTION: u8 = 0xC;

    // Global
    pub const USAGE_PAGE: u8 = 0x0;
    pub const LOGICAL_MINIMUM: u8 = 0x1;
    pub const LOGICAL_MAXIMUM: u8 = 0x2;
    pub const REPORT_SIZE: u8 = 0x7;
    pub const REPORT_ID: u8 = 0x8;
    pub const REPORT_COUNT: u8 = 0x9;
    pub const PUSH: u8 = 0xA;
    pub const POP: u8 = 0xB;

    // Local
    pub const USAGE: u8 = 0x0;
    pub const USAGE_MINIMUM: u8 = 0x1;
    pub const USAGE_MAXIMUM: u8 = 0x2;
}

const LONG_ITEM_PREFIX: u8 = 0xFE;
/// Largest report the 16-bit I2C-HID length fields can carry, in bits
pub const MAX_REPORT_BITS: u32 = u16::MAX as u32 * 8;
const COLLECTION_APPLICATION: u32 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemType {
    Main,
    Global,
    Local,
    Reserved,
}

#[derive(Debug, Clone, Copy)]
struct Item {
    item_type: ItemType,
    tag: u8,
    size: usize,
    data: u32,
}

impl Item {
    /// Data sign-extended from its encoded width
    fn signed(&self) -> i32 {
        match self.size {
            1 => self.data as u8 as i8 as i32,
            2 => self.data as u16 as i16 as i32,
            _ => self.data as i32,
        }
    }
}

struct Items<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Iterator for Items<'_> {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        loop {
            let prefix = *self.bytes.get(self.pos)?;

            if prefix == LONG_ITEM_PREFIX {
                let size = *self.bytes.get(self.pos + 1)? as usize;
                self.pos += 3 + size;
                continue;
            }

            let size = match prefix & 0x03 {
                3 => 4,
                n => n as usize,
            };
            let start = self.pos + 1;
            let Some(raw) = self.bytes.get(start..start + size) else {
                warn!(
                    "Report descriptor truncated at offset {} (item needs {} bytes)",
                    self.pos, size
                );
                self.pos = self.bytes.len();
                return None;
            };
            self.pos = start + size;

            let data = raw
                .iter()
                .rev()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32);
            let item_type = match (prefix >> 2) & 0x03 {
                0 => ItemType::Main,
                1 => ItemType::Global,
                2 => ItemType::Local,
                _ => ItemType::Reserved,
            };

            return Some(Item {
                item_type,
                tag: prefix >> 4,
                size,
                data,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    usage_page: u16,
    logical_min: i32,
    logical_max: i32,
    logical_max_raw: u32,
    logical_max_size: usize,
    report_size: u32,
    report_id: u8,
    report_count: u32,
}

impl GlobalState {
    /// Logical maximum, reinterpreted as unsigned when the signed reading
    /// falls below the minimum (a common descriptor mistake).
    fn effective_logical_max(&self) -> i32 {
        if self.logical_max < self.logical_min {
            let unsigned = match self.logical_max_size {
                1 => self.logical_max_raw & 0xFF,
                2 => self.logical_max_raw & 0xFFFF,
                _ => self.logical_max_raw,
            };
            i32::try_from(unsigned).unwrap_or(i32::MAX)
        } else {
            self.logical_max
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LocalState {
    usages: Vec<Usage>,
    usage_min: Option<Usage>,
    usage_max: Option<Usage>,
}

impl LocalState {
    fn range(&self) -> Option<UsageRange> {
        match (self.usage_min, self.usage_max) {
            (Some(min), Some(max)) => Some(UsageRange { min, max }),
            _ => None,
        }
    }

    /// Usage naming a collection: first listed, else the range start
    fn primary(&self) -> Option<Usage> {
        self.usages.first().copied().or(self.usage_min)
    }
}

/// Parsed report descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDescriptor {
    fields: Vec<Field>,
    applications: Vec<Usage>,
    uses_report_ids: bool,
}

impl ReportDescriptor {
    /// Parse raw descriptor bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut global = GlobalState::default();
        let mut pushed: Vec<GlobalState> = Vec::new();
        let mut local = LocalState::default();
        let mut collections: Vec<(u32, Option<Usage>)> = Vec::new();
        let mut cursors: BTreeMap<(ReportKind, u8), u32> = BTreeMap::new();
        let mut desc = ReportDescriptor::default();

        let items = Items { bytes, pos: 0 };
        for item in items {
            match item.item_type {
                ItemType::Main => {
                    let kind = match item.tag {
                        tag::INPUT => Some(ReportKind::Input),
                        tag::OUTPUT => Some(ReportKind::Output),
                        tag::FEATURE => Some(ReportKind::Feature),
                        tag::COLLECTION => {
                            let usage = local.primary();
                            if item.data == COLLECTION_APPLICATION {
                                if let Some(usage) = usage {
                                    if collections.is_empty() {
                                        desc.applications.push(usage);
                                    }
                                }
                            }
                            collections.push((item.data, usage));
                            None
                        }
                        tag::END_COLLECTION => {
                            if collections.pop().is_none() {
                                debug!("Unbalanced End Collection in report descriptor");
                            }
                            None
                        }
                        _ => None,
                    };

                    if let Some(kind) = kind {
                        if global.report_count > 0 && global.report_size > 0 {
                            let cursor = cursors.entry((kind, global.report_id)).or_insert(0);
                            let end = global
                                .report_size
                                .checked_mul(global.report_count)
                                .and_then(|len| cursor.checked_add(len))
                                .filter(|end| *end <= MAX_REPORT_BITS);
                            let Some(end) = end else {
                                warn!(
                                    "Skipping {:?} item in report {}: {} x {} bits at bit {} exceeds the report limit",
                                    kind, global.report_id, global.report_count, global.report_size, cursor
                                );
                                local = LocalState::default();
                                continue;
                            };
                            let field = Field {
                                kind,
                                report_id: global.report_id,
                                bit_offset: *cursor,
                                bit_size: global.report_size,
                                count: global.report_count,
                                flags: MainFlags(item.data),
                                logical_min: global.logical_min,
                                logical_max: global.effective_logical_max(),
                                usages: std::mem::take(&mut local.usages),
                                usage_range: local.range(),
                                application: top_level_application(&collections),
                            };
                            *cursor = end;
                            desc.fields.push(field);
                        }
                    }

                    local = LocalState::default();
                }
                ItemType::Global => match item.tag {
                    tag::USAGE_PAGE => global.usage_page = item.data as u16,
                    tag::LOGICAL_MINIMUM => global.logical_min = item.signed(),
                    tag::LOGICAL_MAXIMUM => {
                        global.logical_max = item.signed();
                        global.logical_max_raw = item.data;
                        global.logical_max_size = item.size;
                    }
                    tag::REPORT_SIZE => global.report_size = item.data,
                    tag::REPORT_ID => {
                        global.report_id = item.data as u8;
                        desc.uses_report_ids = true;
                    }
                    tag::REPORT_COUNT => global.report_count = item.data,
                    tag::PUSH => pushed.push(global),
                    tag::POP => match pushed.pop() {
                        Some(saved) => global = saved,
                        None => debug!("Pop without Push in report descriptor"),
                    },
                    _ => {}
                },
                ItemType::Local => {
                    let usage = if item.size == 4 {
                        Usage::from_raw(item.data)
                    } else {
                        Usage::new(global.usage_page, item.data as u16)
                    };
                    match item.tag {
                        tag::USAGE => local.usages.push(usage),
                        tag::USAGE_MINIMUM => local.usage_min = Some(usage),
                        tag::USAGE_MAXIMUM => local.usage_max = Some(usage),
                        _ => {}
                    }
                }
                ItemType::Reserved => {}
            }
        }

        desc
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Non-padding input fields, in descriptor order
    pub fn input_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.kind == ReportKind::Input && !f.is_constant())
    }

    /// Top-level application collections, in declaration order
    pub fn applications(&self) -> &[Usage] {
        &self.applications
    }

    /// Whether reports are prefixed with a report id byte
    pub fn uses_report_ids(&self) -> bool {
        self.uses_report_ids
    }

    /// Size in bits of each report of `kind`, keyed by report id
    pub fn report_bits(&self, kind: ReportKind) -> BTreeMap<u8, u32> {
        let mut bits = BTreeMap::new();
        for field in self.fields.iter().filter(|f| f.kind == kind) {
            let total = bits.entry(field.report_id).or_insert(0u32);
            *total = total.saturating_add(field.bit_len());
        }
        bits
    }

    /// Largest report of `kind` in bytes, including the id byte when used
    pub fn report_size(&self, kind: ReportKind) -> usize {
        let id_len = usize::from(self.uses_report_ids);
        self.report_bits(kind)
            .values()
            .map(|bits| (*bits as usize).div_ceil(8) + id_len)
            .max()
            .unwrap_or(0)
    }

    pub fn input_report_size(&self) -> usize {
        self.report_size(ReportKind::Input)
    }
}

fn top_level_application(collections: &[(u32, Option<Usage>)]) -> Option<Usage> {
    collections
        .iter()
        .find(|(kind, _)| *kind == COLLECTION_APPLICATION)
        .and_then(|(_, usage)| *usage)
}
