// TOML profile loading
// Loads map profiles from TOML files at runtime

use super::traits::MapProfile;
use iichid_map::{EventType, MapEntry, RelAbs, Target, Usage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Event type of a custom entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomEvent {
    Key,
    Rel,
    Abs,
    Msc,
}

fn default_count() -> u16 {
    1
}

/// One `[[entries]]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomEntry {
    pub name: String,
    pub page: u16,
    pub usage: u16,
    #[serde(default = "default_count")]
    pub count: u16,
    pub event: CustomEvent,
    pub code: u16,
    #[serde(default)]
    pub required: bool,
    /// Defaults per event type: rel wants relative, abs wants absolute
    #[serde(default)]
    pub relabs: Option<RelAbs>,
}

impl CustomEntry {
    fn to_entry(&self) -> MapEntry {
        let usage = Usage::new(self.page, self.usage);
        let mut entry = match self.event {
            CustomEvent::Key => MapEntry::key(&self.name, usage, self.code),
            CustomEvent::Rel => MapEntry::rel(&self.name, usage, self.code),
            CustomEvent::Abs => MapEntry::abs(&self.name, usage, self.code),
            CustomEvent::Msc => {
                let mut entry = MapEntry::key(&self.name, usage, self.code);
                entry.target = Target::Event {
                    ty: EventType::Msc,
                    code: self.code,
                };
                entry
            }
        }
        .with_count(self.count);
        if let Some(relabs) = self.relabs {
            entry = entry.with_relabs(relabs);
        }
        if self.required {
            entry = entry.required();
        }
        entry
    }
}

/// A profile as written in a TOML file
///
/// ```toml
/// name = "vendor-buttons"
/// description = "Vendor button panel"
/// applications = [{ page = 0x01, id = 0x80 }]
///
/// [[entries]]
/// name = "POWER"
/// page = 0x01
/// usage = 0x81
/// event = "key"
/// code = 116
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub applications: Vec<Usage>,
    #[serde(default)]
    pub entries: Vec<CustomEntry>,
}

impl CustomProfile {
    /// Load profile from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| LoadError::Io(e.to_string()))?;
        Self::load_from_toml(&content)
    }

    /// Load profile from a TOML string
    pub fn load_from_toml(text: &str) -> Result<Self, LoadError> {
        let profile: CustomProfile =
            toml::from_str(text).map_err(|e| LoadError::Parse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.name.is_empty() {
            return Err(LoadError::Validation("profile name is empty".to_string()));
        }
        if self.applications.is_empty() {
            return Err(LoadError::Validation(format!(
                "{}: no application collections",
                self.name
            )));
        }
        if self.entries.is_empty() {
            return Err(LoadError::Validation(format!("{}: no entries", self.name)));
        }
        for entry in &self.entries {
            entry
                .to_entry()
                .validate()
                .map_err(|e| LoadError::Validation(format!("{}: {}", self.name, e)))?;
        }
        Ok(())
    }
}

impl MapProfile for CustomProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }

    fn applications(&self) -> Vec<Usage> {
        self.applications.clone()
    }

    fn table(&self) -> Vec<MapEntry> {
        self.entries.iter().map(CustomEntry::to_entry).collect()
    }
}

/// Profile loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
