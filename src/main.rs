//! iichid CLI
//!
//! Inspect report descriptors, try map profiles offline and drive HID over
//! I2C devices from userspace.

use clap::Parser;
use iichid::DeviceConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(DeviceConfig::default_path);

    match cli.command {
        // === Offline Commands ===
        Commands::Descriptor { file } => {
            commands::inspect::descriptor(&file)?;
        }
        Commands::Probe { rdesc, profile } => {
            let registry = commands::load_registry(&cli.profile_dirs, &[])?;
            commands::inspect::probe(&registry, &rdesc, profile.as_deref())?;
        }
        Commands::Decode {
            rdesc,
            profile,
            reports,
        } => {
            let registry = commands::load_registry(&cli.profile_dirs, &[])?;
            commands::inspect::decode(&registry, &rdesc, profile.as_deref(), &reports)?;
        }
        Commands::Profiles => {
            let registry = commands::load_registry(&cli.profile_dirs, &[])?;
            commands::inspect::profiles(&registry);
        }

        // === Device Commands ===
        Commands::Identify => {
            let config = DeviceConfig::load(&config_path)?;
            commands::device::identify(&config)?;
        }
        Commands::Simulate => {
            let config = DeviceConfig::load(&config_path)?;
            let registry = commands::load_registry(&cli.profile_dirs, &config.profile_dirs)?;
            commands::device::simulate(&config, &registry).await?;
        }
        Commands::Run { rate } => {
            let config = DeviceConfig::load(&config_path)?;
            let registry = commands::load_registry(&cli.profile_dirs, &config.profile_dirs)?;
            commands::device::run(&config, &registry, rate).await?;
        }
        Commands::InitConfig { force } => {
            commands::device::init_config(&config_path, force)?;
        }
    }

    Ok(())
}
