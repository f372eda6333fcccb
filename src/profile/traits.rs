// Map profile trait definition
// A profile is a thin driver: the application collections it serves plus a map table

use iichid_map::{MapEntry, ReportDescriptor, Usage};

/// Map profile - supplies the table for one kind of device
///
/// This trait is object-safe for dynamic dispatch (Arc<dyn MapProfile>).
/// Implementations can be either builtin Rust structs or loaded from TOML.
pub trait MapProfile: Send + Sync {
    /// Internal name (e.g., "system-control")
    fn name(&self) -> &str;

    /// User-facing description (e.g., "System Control")
    fn description(&self) -> &str;

    /// Top-level application collections this profile serves
    fn applications(&self) -> Vec<Usage>;

    /// A fresh map table; callbacks carry per-device state
    fn table(&self) -> Vec<MapEntry>;

    /// Whether the descriptor has a collection this profile serves
    fn serves(&self, rdesc: &ReportDescriptor) -> bool {
        let wanted = self.applications();
        rdesc.applications().iter().any(|app| wanted.contains(app))
    }
}
