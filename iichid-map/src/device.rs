//! Attached device: command engine + delivery + map, wired together
//!
//! ```text
//! attach:  connect (HID descriptor) ─► report descriptor ─► resolve map
//!          ─► allocate interrupt (or fall back to polling) ─► start delivery
//! detach:  stop delivery (drain worker) ─► Detaching callbacks
//! ```

use std::sync::Arc;

use futures::stream::{self, Stream};
use iichid_transport::{
    BoxedBus, CommandEngine, Delivery, DeliveryConfig, DeliveryStatus, DeviceDescriptor,
    HardwareIdentity, InterruptSource, RateChange, ReportDescriptor, ReportHandler, ReportType,
    SharedEngine,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::binding::Capabilities;
use crate::error::MapError;
use crate::event::{InputDeclaration, InputEvent};
use crate::item::MapEntry;
use crate::map::HidMap;

/// Events buffered per subscriber before it starts lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachConfig {
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Per-device debug dumps (descriptor, reports, decoded fields)
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            debug: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Feeds fetched reports through the map into the event channel
struct MapHandler {
    map: Arc<Mutex<HidMap>>,
    events: broadcast::Sender<InputEvent>,
}

impl ReportHandler for MapHandler {
    fn handle_report(&mut self, report: &[u8]) {
        self.map.lock().decode(report, &mut self.events);
    }
}

/// A HID over I2C device producing input events
pub struct HidDevice {
    engine: SharedEngine,
    report_descriptor: ReportDescriptor,
    map: Arc<Mutex<HidMap>>,
    delivery: Delivery,
    events: broadcast::Sender<InputEvent>,
}

impl HidDevice {
    /// Bring a device up with the given map table.
    ///
    /// Fails if the HID descriptor is broken or a required usage is missing.
    /// A device without an interrupt line is polled.
    pub async fn attach(
        bus: BoxedBus,
        identity: HardwareIdentity,
        interrupts: &dyn InterruptSource,
        table: Vec<MapEntry>,
        config: AttachConfig,
    ) -> Result<Self, MapError> {
        let engine = Arc::new(CommandEngine::connect(bus, identity, config.debug).await?);
        let fetched = engine.fetch_report_descriptor().await?;

        let mut map = HidMap::attach(&fetched.parsed, table)?;
        map.set_debug(config.debug);
        let map = Arc::new(Mutex::new(map));

        let interrupt = match interrupts.allocate(engine.identity()) {
            Ok(line) => Some(line),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let handler = MapHandler {
            map: map.clone(),
            events: events.clone(),
        };
        let delivery_config = DeliveryConfig {
            debug: config.debug || config.delivery.debug,
            ..config.delivery
        };
        let delivery = Delivery::start(engine.clone(), interrupt, Box::new(handler), delivery_config);

        let descriptor = engine.descriptor();
        info!(
            "Attached {:04x}:{:04x} v{:04x} at {} ({})",
            descriptor.vendor_id(),
            descriptor.product_id(),
            descriptor.version_id(),
            engine.identity(),
            delivery.status().mode
        );

        Ok(Self {
            engine,
            report_descriptor: fetched.parsed,
            map,
            delivery,
            events,
        })
    }

    pub fn identity(&self) -> &HardwareIdentity {
        self.engine.identity()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.engine.descriptor()
    }

    pub fn report_descriptor(&self) -> &ReportDescriptor {
        &self.report_descriptor
    }

    pub fn capabilities(&self) -> Capabilities {
        self.map.lock().capabilities().clone()
    }

    pub fn declaration(&self) -> InputDeclaration {
        self.map.lock().declaration().clone()
    }

    /// Receiver for decoded events; each subscriber sees every event
    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.events.subscribe()
    }

    /// Decoded events as a stream that ends when the device is detached
    pub fn events(&self) -> impl Stream<Item = InputEvent> + Send + 'static {
        stream::unfold(self.events.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event consumer lagged, {} events dropped", n)
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    pub async fn set_sampling_rate(&self, rate: i32) -> Result<RateChange, MapError> {
        Ok(self.delivery.set_sampling_rate(rate).await?)
    }

    pub fn sampling_rate(&self) -> i32 {
        self.delivery.sampling_rate()
    }

    pub fn status(&self) -> DeliveryStatus {
        self.delivery.status()
    }

    pub async fn get_report(
        &self,
        report_type: ReportType,
        id: u8,
        len: usize,
    ) -> Result<Vec<u8>, MapError> {
        Ok(self.engine.get_report(report_type, id, len).await?)
    }

    /// Stop delivery, wait for the in-flight report, then detach the map.
    pub async fn detach(self) -> Result<(), MapError> {
        let address = self.identity().address;
        self.delivery.shutdown().await?;
        self.map.lock().detach();
        info!("Detached device at 0x{:02x}", address);
        Ok(())
    }
}
