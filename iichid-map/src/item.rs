//! Map tables: what a driver wants from a report descriptor
//!
//! A table is an ordered list of [`MapEntry`]s. Each entry names a usage (or
//! a run of consecutive usages) and says what to do with the matching field:
//! emit an input event, or hand the value to a [`MapCallback`].

use std::fmt;
use std::sync::Arc;

use iichid_transport::{Usage, UsageRange};
use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::event::{EventSink, EventType, InputDeclaration};

/// Whether an entry accepts relative fields, absolute fields or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelAbs {
    #[default]
    Any,
    Relative,
    Absolute,
}

impl RelAbs {
    /// Whether a field with the given relative flag satisfies this constraint
    pub fn accepts(&self, relative: bool) -> bool {
        match self {
            RelAbs::Any => true,
            RelAbs::Relative => relative,
            RelAbs::Absolute => !relative,
        }
    }
}

/// Lifecycle phase a callback is invoked in
pub enum Phase<'a> {
    /// Once, while the map is being attached; declare what will be emitted
    Attaching(&'a mut InputDeclaration),
    /// Once per report. `value` is 0 for completion callbacks.
    Running {
        value: i32,
        sink: &'a mut dyn EventSink,
    },
    /// Once, when the device goes away
    Detaching,
}

impl fmt::Debug for Phase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Attaching(_) => write!(f, "Attaching"),
            Phase::Running { value, .. } => write!(f, "Running({value})"),
            Phase::Detaching => write!(f, "Detaching"),
        }
    }
}

/// What the engine should do with a callback after an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Continue,
    /// Never call again, not even for Detaching
    Disable,
}

/// Reporting callback bound to a map entry
pub trait MapCallback: Send + Sync {
    fn invoke(&self, phase: Phase<'_>) -> CallbackStatus;
}

impl<F> MapCallback for F
where
    F: Fn(Phase<'_>) -> CallbackStatus + Send + Sync,
{
    fn invoke(&self, phase: Phase<'_>) -> CallbackStatus {
        self(phase)
    }
}

/// Destination of a matched field
#[derive(Clone)]
pub enum Target {
    Event { ty: EventType, code: u16 },
    Callback(Arc<dyn MapCallback>),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Event { ty, code } => write!(f, "{}:0x{:03x}", ty.name(), code),
            Target::Callback(_) => write!(f, "callback"),
        }
    }
}

/// One wanted usage
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub name: String,
    /// None for completion callbacks, which run once per report
    pub usage: Option<Usage>,
    /// Consecutive usages covered, starting at `usage`; event codes advance with them
    pub usage_count: u16,
    pub target: Target,
    pub required: bool,
    pub relabs: RelAbs,
}

impl MapEntry {
    fn new(name: &str, usage: Option<Usage>, target: Target, relabs: RelAbs) -> Self {
        Self {
            name: name.to_string(),
            usage,
            usage_count: 1,
            target,
            required: false,
            relabs,
        }
    }

    pub fn key(name: &str, usage: Usage, code: u16) -> Self {
        Self::new(name, Some(usage), Target::Event { ty: EventType::Key, code }, RelAbs::Any)
    }

    pub fn rel(name: &str, usage: Usage, code: u16) -> Self {
        Self::new(name, Some(usage), Target::Event { ty: EventType::Rel, code }, RelAbs::Relative)
    }

    pub fn abs(name: &str, usage: Usage, code: u16) -> Self {
        Self::new(name, Some(usage), Target::Event { ty: EventType::Abs, code }, RelAbs::Absolute)
    }

    pub fn callback(name: &str, usage: Usage, callback: Arc<dyn MapCallback>) -> Self {
        Self::new(name, Some(usage), Target::Callback(callback), RelAbs::Any)
    }

    /// Callback run after every report, bound to no field
    pub fn completion(name: &str, callback: Arc<dyn MapCallback>) -> Self {
        Self::new(name, None, Target::Callback(callback), RelAbs::Any)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_relabs(mut self, relabs: RelAbs) -> Self {
        self.relabs = relabs;
        self
    }

    /// Cover `count` consecutive usages (e.g. Button 1..16 -> BTN_LEFT..)
    pub fn with_count(mut self, count: u16) -> Self {
        self.usage_count = count;
        self
    }

    pub fn is_completion(&self) -> bool {
        self.usage.is_none()
    }

    pub fn callback_target(&self) -> Option<&Arc<dyn MapCallback>> {
        match &self.target {
            Target::Callback(cb) => Some(cb),
            Target::Event { .. } => None,
        }
    }

    /// Usages this entry covers
    pub fn usage_range(&self) -> Option<UsageRange> {
        let min = self.usage?;
        let last = min.id.checked_add(self.usage_count.checked_sub(1)?)?;
        Some(UsageRange {
            min,
            max: Usage::new(min.page, last),
        })
    }

    /// Event code for `usage`, offset from the entry's base code
    pub(crate) fn code_for(&self, usage: Usage) -> Option<u16> {
        let Target::Event { code, .. } = self.target else {
            return None;
        };
        let base = self.usage?;
        code.checked_add(usage.id.checked_sub(base.id)?)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.usage.is_some() && self.usage_range().is_none() {
            return Err(MapError::InvalidEntry(format!(
                "{}: usage count {} does not fit the page",
                self.name, self.usage_count
            )));
        }
        if self.is_completion() && self.callback_target().is_none() {
            return Err(MapError::InvalidEntry(format!(
                "{}: entries without a usage need a callback",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::codes;
    use crate::usages;

    #[test]
    fn test_builders() {
        let x = MapEntry::abs("X", usages::desktop(usages::desktop::X), codes::ABS_X).required();
        assert!(x.required);
        assert_eq!(x.relabs, RelAbs::Absolute);
        assert!(!x.is_completion());

        let wheel = MapEntry::rel("WHEEL", usages::desktop(usages::desktop::WHEEL), codes::REL_WHEEL);
        assert_eq!(wheel.relabs, RelAbs::Relative);
    }

    #[test]
    fn test_ranged_codes() {
        let buttons = MapEntry::key("BUTTONS", usages::button(1), codes::BTN_MOUSE).with_count(16);
        let range = buttons.usage_range().unwrap();
        assert_eq!(range.len(), 16);
        assert_eq!(buttons.code_for(usages::button(3)), Some(codes::BTN_MIDDLE));
        assert_eq!(buttons.code_for(Usage::new(0x09, 0)), None);
    }

    #[test]
    fn test_validate() {
        let zero = MapEntry::key("NONE", usages::button(1), codes::BTN_LEFT).with_count(0);
        assert!(zero.validate().is_err());

        let cb: Arc<dyn MapCallback> = Arc::new(|_: Phase<'_>| CallbackStatus::Continue);
        assert!(MapEntry::completion("DONE", cb).validate().is_ok());
    }

    #[test]
    fn test_relabs_accepts() {
        assert!(RelAbs::Any.accepts(true));
        assert!(RelAbs::Relative.accepts(true));
        assert!(!RelAbs::Relative.accepts(false));
        assert!(RelAbs::Absolute.accepts(false));
    }
}
