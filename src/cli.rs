// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iichid")]
#[command(author, version, about = "Userspace HID over I2C driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Device config file (default: ~/.config/iichid/device.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Extra directory with TOML map profiles (repeatable)
    #[arg(long = "profile-dir", global = true, value_name = "DIR")]
    pub profile_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Offline Commands ===
    /// Dump the fields of a report descriptor
    #[command(visible_aliases = ["desc", "rdesc"])]
    Descriptor {
        /// Report descriptor file (binary or hex text)
        file: PathBuf,
    },

    /// Show which entries of a profile a report descriptor supports
    Probe {
        /// Report descriptor file (binary or hex text)
        rdesc: PathBuf,
        /// Profile name; selected by application collection when omitted
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Decode input reports into input events
    Decode {
        /// Report descriptor file (binary or hex text)
        rdesc: PathBuf,
        /// Profile name; selected by application collection when omitted
        #[arg(short, long)]
        profile: Option<String>,
        /// Input reports as hex, e.g. "01 05 fb 00" (report id first when used)
        #[arg(required = true)]
        reports: Vec<String>,
    },

    /// List the built-in and loaded map profiles
    #[command(visible_alias = "ls")]
    Profiles,

    // === Device Commands ===
    /// Resolve device identities from the firmware nodes in the config
    #[command(visible_alias = "id")]
    Identify,

    /// Attach to the simulated device from the config and replay its reports
    #[command(visible_alias = "sim")]
    Simulate,

    /// Attach to the configured i2c-dev device and print events until Ctrl+C
    Run {
        /// Sampling rate (reports per second)
        #[arg(short, long)]
        rate: Option<i32>,
    },

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
