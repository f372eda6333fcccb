//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `inspect`: offline commands (descriptor, probe, decode, profiles)
//! - `device`: commands talking to a device (identify, simulate, run, init-config)

pub mod device;
pub mod inspect;

use anyhow::{anyhow, Context};
use iichid::{MapProfile, ProfileRegistry, AUTO_PROFILE};
use iichid_map::ReportDescriptor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Builtin profiles plus every TOML profile in the given directories
pub fn load_registry(
    cli_dirs: &[PathBuf],
    config_dirs: &[PathBuf],
) -> anyhow::Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::with_builtins();
    for dir in config_dirs.iter().chain(cli_dirs) {
        let count = registry
            .load_from_directory(dir)
            .with_context(|| format!("loading profiles from {}", dir.display()))?;
        info!("Loaded {} profiles from {}", count, dir.display());
    }
    Ok(registry)
}

/// Profile by name, or the first one serving the descriptor
pub fn resolve_profile(
    registry: &ProfileRegistry,
    name: Option<&str>,
    rdesc: &ReportDescriptor,
) -> anyhow::Result<Arc<dyn MapProfile>> {
    match name {
        Some(name) if name != AUTO_PROFILE => registry
            .find(name)
            .ok_or_else(|| anyhow!("unknown profile '{}'", name)),
        _ => registry.select(rdesc).ok_or_else(|| {
            let apps: Vec<String> = rdesc.applications().iter().map(|u| u.to_string()).collect();
            anyhow!(
                "no profile serves application collections [{}]",
                apps.join(", ")
            )
        }),
    }
}
