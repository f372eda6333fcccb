// Profile registry
// Central registry for looking up map profiles by name or by descriptor

use super::builtin::{DigitizerProfile, MouseProfile, PenProfile, SystemControlProfile};
use super::custom::{CustomProfile, LoadError};
use super::traits::MapProfile;
use iichid_map::ReportDescriptor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry for map profiles
/// Lookup by name, or selection by the application collections of a descriptor
pub struct ProfileRegistry {
    /// Profiles indexed by name
    by_name: HashMap<String, Arc<dyn MapProfile>>,
    /// Names in registration order; selection walks this
    order: Vec<String>,
}

impl ProfileRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create a registry with builtin profiles pre-loaded
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.load_builtins();
        registry
    }

    /// Load all builtin profiles
    pub fn load_builtins(&mut self) {
        self.register(Arc::new(SystemControlProfile));
        // Pen before the generic digitizer
        self.register(Arc::new(PenProfile));
        self.register(Arc::new(DigitizerProfile));
        self.register(Arc::new(MouseProfile));
    }

    /// Register a profile; a profile with the same name is replaced in place
    pub fn register(&mut self, profile: Arc<dyn MapProfile>) {
        let name = profile.name().to_string();
        if self.by_name.insert(name.clone(), profile).is_some() {
            debug!("Replacing profile {}", name);
        } else {
            self.order.push(name);
        }
    }

    /// Find profile by name
    pub fn find(&self, name: &str) -> Option<Arc<dyn MapProfile>> {
        self.by_name.get(name).cloned()
    }

    /// First profile serving one of the descriptor's application collections
    pub fn select(&self, rdesc: &ReportDescriptor) -> Option<Arc<dyn MapProfile>> {
        self.all_profiles()
            .into_iter()
            .find(|profile| profile.serves(rdesc))
    }

    /// All registered profiles, in registration order
    pub fn all_profiles(&self) -> Vec<Arc<dyn MapProfile>> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name).cloned())
            .collect()
    }

    /// Get the number of registered profiles
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Load a profile from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        let profile = CustomProfile::load_from_file(path)?;
        self.register(Arc::new(profile));
        Ok(())
    }

    /// Load all TOML profiles from a directory
    pub fn load_from_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize, LoadError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LoadError::Io(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| LoadError::Io(e.to_string()))? {
            let entry = entry.map_err(|e| LoadError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                paths.push(path);
            }
        }
        // read_dir order is unspecified
        paths.sort();

        let mut count = 0;
        for path in paths {
            match self.load_from_file(&path) {
                Ok(()) => count += 1,
                Err(e) => {
                    warn!("Failed to load profile from {}: {}", path.display(), e);
                }
            }
        }

        Ok(count)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Global profile registry singleton
/// Use `profile_registry()` to access
static REGISTRY: std::sync::OnceLock<ProfileRegistry> = std::sync::OnceLock::new();

/// Get the global profile registry
/// Initializes with builtin profiles on first access
pub fn profile_registry() -> &'static ProfileRegistry {
    REGISTRY.get_or_init(ProfileRegistry::with_builtins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// System control collection with one power button bit
    const SYSCTL: &[u8] = &[
        0x05, 0x01, 0x09, 0x80, 0xA1, 0x01, 0x09, 0x81, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01,
        0x95, 0x01, 0x81, 0x02, 0x95, 0x07, 0x81, 0x03, 0xC0,
    ];

    #[test]
    fn test_registry_with_builtins() {
        let registry = ProfileRegistry::with_builtins();
        assert_eq!(registry.len(), 4);

        let names: Vec<String> = registry
            .all_profiles()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["system-control", "pen", "digitizer", "mouse"]);

        assert_eq!(registry.find("mouse").unwrap().description(), "Mouse");
        assert!(registry.find("nonexistent").is_none());
    }

    #[test]
    fn test_select_by_application() {
        let registry = ProfileRegistry::with_builtins();
        let rdesc = ReportDescriptor::parse(SYSCTL);
        assert_eq!(registry.select(&rdesc).unwrap().name(), "system-control");

        let vendor = ReportDescriptor::parse(&[0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, 0xC0]);
        assert!(registry.select(&vendor).is_none());
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = ProfileRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(MouseProfile));
        registry.register(Arc::new(MouseProfile));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all_profiles().len(), 1);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = std::fs::File::create(dir.path().join("power.toml")).unwrap();
        writeln!(
            good,
            r#"name = "power-only"
applications = [{{ page = 1, id = 0x80 }}]

[[entries]]
name = "POWER"
page = 1
usage = 0x81
event = "key"
code = 116"#
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "name = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = ProfileRegistry::new();
        assert_eq!(registry.load_from_directory(dir.path()).unwrap(), 1);
        let rdesc = ReportDescriptor::parse(SYSCTL);
        assert_eq!(registry.select(&rdesc).unwrap().name(), "power-only");

        assert!(matches!(
            registry.load_from_directory(dir.path().join("missing")),
            Err(LoadError::Io(_))
        ));
    }
}
