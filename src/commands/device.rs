//! Device command handlers: identify, simulate, run, init-config.

use super::{resolve_profile, CommandResult};
use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use iichid::{load_bytes, parse_hex, DeviceConfig, LinuxI2cBus, MapProfile, ProfileRegistry};
use iichid_map::{HardwareIdentity, HidDevice, RateChange};
use iichid_transport::acpi::is_hid_over_i2c;
use iichid_transport::{
    resolve_identity, BoxedBus, CommandEngine, DescriptorLayout, FirmwareNode, InterruptSource,
    NoInterrupts, SimulatedDevice,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Address of the simulated device when the config names none
const SIM_ADDRESS: u16 = 0x2C;

/// How long to wait for queued simulated reports to be consumed
const SIM_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve identities from the firmware nodes in the config
pub fn identify(config: &DeviceConfig) -> CommandResult {
    if config.nodes.is_empty() {
        println!("No firmware nodes configured");
    }
    for (index, node) in config.nodes.iter().enumerate() {
        let hid = node.hardware_id().unwrap_or("<none>");
        if !is_hid_over_i2c(node) {
            println!("Node {index}: {hid} - not a present HID over I2C device");
            continue;
        }
        match resolve_identity(node) {
            Ok(identity) => println!("Node {index}: {identity}"),
            Err(e) => println!("Node {index}: {hid} - {e}"),
        }
    }

    match config.identity() {
        Ok(identity) => println!("\nSelected: {identity}"),
        Err(e) => println!("\nSelected: none ({e})"),
    }
    Ok(())
}

/// Profile named by the config, or the one serving the device's descriptor
async fn pick_profile(
    bus: &BoxedBus,
    identity: &HardwareIdentity,
    config: &DeviceConfig,
    registry: &ProfileRegistry,
) -> anyhow::Result<Arc<dyn MapProfile>> {
    let engine = CommandEngine::connect(bus.clone(), identity.clone(), config.debug)
        .await
        .with_context(|| format!("connecting to {identity}"))?;
    let fetched = engine
        .fetch_report_descriptor()
        .await
        .context("fetching report descriptor")?;
    let profile = resolve_profile(registry, Some(&config.profile), &fetched.parsed)?;
    info!("Using profile {} ({})", profile.name(), profile.description());
    Ok(profile)
}

/// Print events until the stream ends
fn spawn_printer(device: &HidDevice) -> JoinHandle<usize> {
    let mut events = Box::pin(device.events());
    tokio::spawn(async move {
        let mut count = 0;
        while let Some(event) = events.next().await {
            println!("{event}");
            count += 1;
        }
        count
    })
}

async fn apply_rate(device: &HidDevice, rate: i32) -> CommandResult {
    match device.set_sampling_rate(rate).await? {
        RateChange::Applied => info!("Sampling rate set to {}", rate),
        RateChange::Unchanged => info!("Sampling rate already {}", rate),
        RateChange::Rejected => warn!("Sampling rate {} rejected", rate),
    }
    Ok(())
}

/// Attach to the simulated device described in the config and replay its reports
pub async fn simulate(config: &DeviceConfig, registry: &ProfileRegistry) -> CommandResult {
    let sim_config = config
        .simulation
        .as_ref()
        .ok_or_else(|| anyhow!("config has no [simulation] table"))?;

    let rdesc = load_bytes(&sim_config.report_descriptor)
        .with_context(|| format!("reading {}", sim_config.report_descriptor.display()))?;
    let reports = sim_config
        .reports
        .iter()
        .map(|text| parse_hex(text).with_context(|| format!("parsing report '{text}'")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let identity = if config.address.is_none() && config.nodes.is_empty() {
        HardwareIdentity {
            address: SIM_ADDRESS,
            irq: None,
            gpio_pin: None,
            descriptor_register: config.descriptor_register,
            hardware_id: "PNP0C50".to_string(),
        }
    } else {
        config.identity()?
    };

    let layout = DescriptorLayout {
        vendor_id: sim_config.vendor_id,
        product_id: sim_config.product_id,
        ..Default::default()
    };
    let sim = Arc::new(SimulatedDevice::new(
        identity.address,
        identity.descriptor_register,
        layout,
        rdesc,
    ));
    let bus: BoxedBus = sim.clone();
    let interrupts: Box<dyn InterruptSource> = if sim_config.interrupt {
        Box::new(sim.interrupt())
    } else {
        Box::new(NoInterrupts)
    };

    let profile = pick_profile(&bus, &identity, config, registry).await?;
    let device = HidDevice::attach(
        bus,
        identity,
        interrupts.as_ref(),
        profile.table(),
        config.attach_config(),
    )
    .await
    .context("attaching simulated device")?;
    println!("Capabilities: {}", device.capabilities());

    if let Some(rate) = sim_config.sampling_rate {
        apply_rate(&device, rate).await?;
    }

    let printer = spawn_printer(&device);
    let interval = Duration::from_millis(sim_config.interval_ms);
    for report in &reports {
        sim.queue_input(report);
        tokio::time::sleep(interval).await;
    }

    // polled devices may lag behind the replay
    let drained = tokio::time::timeout(SIM_DRAIN_TIMEOUT, async {
        while sim.pending_inputs() > 0 {
            tokio::time::sleep(interval.max(Duration::from_millis(10))).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("{} reports never fetched", sim.pending_inputs());
    }

    device.detach().await?;
    let count = printer.await.context("event printer")?;
    info!("Replayed {} reports, {} events", reports.len(), count);
    Ok(())
}

/// Attach to the configured i2c-dev device and print events until Ctrl+C
pub async fn run(
    config: &DeviceConfig,
    registry: &ProfileRegistry,
    rate: Option<i32>,
) -> CommandResult {
    let identity = config.identity()?;
    let bus: BoxedBus = Arc::new(
        LinuxI2cBus::open(&config.bus).with_context(|| format!("opening {}", config.bus.display()))?,
    );

    let profile = pick_profile(&bus, &identity, config, registry).await?;
    // i2c-dev gives no access to the interrupt line; delivery polls
    let device = HidDevice::attach(
        bus,
        identity,
        &NoInterrupts,
        profile.table(),
        config.attach_config(),
    )
    .await
    .context("attaching device")?;

    let descriptor = device.descriptor();
    println!(
        "Device {:04x}:{:04x} v{:04x} at {}",
        descriptor.vendor_id(),
        descriptor.product_id(),
        descriptor.version_id(),
        device.identity()
    );
    println!("Capabilities: {}", device.capabilities());

    if let Some(rate) = rate {
        apply_rate(&device, rate).await?;
    }
    let status = device.status();
    println!(
        "Delivery: {} at {}/s (Ctrl+C to stop)",
        status.mode, status.sampling_rate
    );

    let mut events = Box::pin(device.events());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.next() => match event {
                Some(event) => println!("{event}"),
                None => break,
            },
        }
    }

    device.detach().await?;
    Ok(())
}

/// Write the default config file
pub fn init_config(path: &Path, force: bool) -> CommandResult {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    DeviceConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
