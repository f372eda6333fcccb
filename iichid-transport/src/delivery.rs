//! Report delivery: interrupt or timer-polled fetches through one worker
//!
//! Each device gets two tasks:
//!
//! ```text
//!   interrupt listener ─┐
//!                       ├─► trigger (Notify) ─► worker: fetch input report ─► ReportHandler
//!   actor timer ────────┘                          │
//!        ▲                                         │ cycle complete
//!        └─────────────────────────────────────────┘ (re-arm timer)
//! ```
//!
//! The actor owns every mode field (rate, timer, interrupt attachment) and
//! is the only place they change. Rate changes arrive as messages. The worker
//! never looks at mode state, so an in-flight fetch finishes under whatever
//! mode was active when it started.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{hex_dump, SharedEngine};
use crate::error::TransportError;
use crate::types::HardwareIdentity;

/// Polling rate used when no interrupt can be attached
pub const DEFAULT_SAMPLING_RATE: i32 = 60;

/// Timer resolution; periods are whole ticks
pub const DEFAULT_TICKS_PER_SECOND: u32 = 1000;

/// Rate value meaning "interrupt driven"
pub const INTERRUPT_RATE: i32 = -1;

const REQUEST_QUEUE_SIZE: usize = 8;

// ============================================================================
// Seams
// ============================================================================

/// Consumer of raw input reports.
///
/// Called from the worker task with the bytes following the length prefix.
pub trait ReportHandler: Send {
    fn handle_report(&mut self, report: &[u8]);
}

impl<F> ReportHandler for F
where
    F: FnMut(&[u8]) + Send,
{
    fn handle_report(&mut self, report: &[u8]) {
        (*self)(report)
    }
}

/// An attached interrupt line.
#[async_trait]
pub trait InterruptLine: Send + Sync {
    /// Resolve once the device signals that data is ready.
    ///
    /// Must be cancel safe: the listener is dropped mid-wait on detach.
    async fn wait(&self) -> Result<(), TransportError>;

    fn name(&self) -> String {
        "irq".to_string()
    }
}

/// Allocates interrupt lines for devices.
pub trait InterruptSource: Send + Sync {
    /// Fails with `ResourceUnavailable` when the device has no usable line.
    fn allocate(&self, identity: &HardwareIdentity) -> Result<Arc<dyn InterruptLine>, TransportError>;
}

/// Source for environments without interrupt access (e.g. userspace i2c-dev)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupts;

impl InterruptSource for NoInterrupts {
    fn allocate(&self, identity: &HardwareIdentity) -> Result<Arc<dyn InterruptLine>, TransportError> {
        Err(TransportError::ResourceUnavailable(format!(
            "no interrupt line for device at 0x{:02x}",
            identity.address
        )))
    }
}

impl<T: InterruptLine + 'static> InterruptSource for Arc<T> {
    fn allocate(&self, _identity: &HardwareIdentity) -> Result<Arc<dyn InterruptLine>, TransportError> {
        Ok(self.clone() as Arc<dyn InterruptLine>)
    }
}

// ============================================================================
// Public types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Polling rate (per second) used when falling back from interrupts
    #[serde(default = "default_sampling_rate")]
    pub default_rate: i32,
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
    /// Dump every fetched report
    #[serde(default)]
    pub debug: bool,
}

fn default_sampling_rate() -> i32 {
    DEFAULT_SAMPLING_RATE
}

fn default_ticks_per_second() -> u32 {
    DEFAULT_TICKS_PER_SECOND
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_SAMPLING_RATE,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            debug: false,
        }
    }
}

impl DeliveryConfig {
    /// Timer period for `rate` polls per second, in whole ticks (at least one)
    pub fn period(&self, rate: i32) -> Option<Duration> {
        if rate <= 0 || self.ticks_per_second == 0 {
            return None;
        }
        let ticks = (self.ticks_per_second / rate as u32).max(1);
        Some(Duration::from_secs(ticks as u64) / self.ticks_per_second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    Interrupt,
    Polling { rate: u32 },
    Disabled,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Interrupt => write!(f, "interrupt"),
            DeliveryMode::Polling { rate } => write!(f, "polling at {rate}/s"),
            DeliveryMode::Disabled => write!(f, "disabled"),
        }
    }
}

/// Snapshot of the actor's mode fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub mode: DeliveryMode,
    /// Signed sampling rate; negative means interrupt driven
    pub sampling_rate: i32,
    pub timer_period: Option<Duration>,
    pub timer_armed: bool,
    pub interrupt_attached: bool,
    /// Whether an interrupt line is held (lost once the line fails)
    pub has_interrupt: bool,
}

/// Outcome of a sampling rate write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChange {
    Applied,
    /// Requested rate is already active
    Unchanged,
    /// Infeasible request, nothing changed
    Rejected,
}

enum Request {
    SetRate {
        rate: i32,
        reply: oneshot::Sender<RateChange>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running delivery actor.
///
/// Dropping the handle tears delivery down in the background; call
/// [`Delivery::shutdown`] to wait for the worker to drain.
pub struct Delivery {
    request_tx: mpsc::Sender<Request>,
    status_rx: watch::Receiver<DeliveryStatus>,
}

impl Delivery {
    /// Start delivering reports from `engine` to `handler`.
    ///
    /// With an interrupt line the device starts interrupt driven; without
    /// one it polls at `config.default_rate`.
    pub fn start(
        engine: SharedEngine,
        interrupt: Option<Arc<dyn InterruptLine>>,
        handler: Box<dyn ReportHandler>,
        config: DeliveryConfig,
    ) -> Self {
        let trigger = Arc::new(Notify::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (cycle_tx, cycle_rx) = mpsc::unbounded_channel();
        let (line_failed_tx, line_failed_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(
            engine,
            handler,
            trigger.clone(),
            stop_rx,
            cycle_tx,
            config.debug,
        ));

        let mut actor = DeliveryActor {
            config,
            rate: INTERRUPT_RATE,
            timer_setup: false,
            deadline: None,
            interrupt,
            listener: None,
            trigger,
            worker: Some(worker),
            stop_tx,
            cycle_rx,
            line_failed_tx,
            line_failed_rx,
            status_tx: None,
        };
        actor.init();

        let (status_tx, status_rx) = watch::channel(actor.status());
        actor.status_tx = Some(status_tx);

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        tokio::spawn(actor.run(request_rx));

        Self {
            request_tx,
            status_rx,
        }
    }

    /// Apply the sampling rate transition table.
    pub async fn set_sampling_rate(&self, rate: i32) -> Result<RateChange, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(Request::SetRate { rate, reply })
            .await
            .map_err(|_| TransportError::Stopped)?;
        rx.await.map_err(|_| TransportError::Stopped)
    }

    pub fn sampling_rate(&self) -> i32 {
        self.status_rx.borrow().sampling_rate
    }

    pub fn status(&self) -> DeliveryStatus {
        *self.status_rx.borrow()
    }

    /// Status updates (rate writes, teardown); outlives the handle
    pub fn subscribe_status(&self) -> watch::Receiver<DeliveryStatus> {
        self.status_rx.clone()
    }

    /// Tear down and wait until the worker has drained.
    pub async fn shutdown(self) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(Request::Shutdown { reply })
            .await
            .map_err(|_| TransportError::Stopped)?;
        rx.await.map_err(|_| TransportError::Stopped)
    }
}

// ============================================================================
// Actor
// ============================================================================

struct DeliveryActor {
    config: DeliveryConfig,
    rate: i32,
    /// Timer is configured (polling mode); only then may it be armed
    timer_setup: bool,
    deadline: Option<Instant>,
    interrupt: Option<Arc<dyn InterruptLine>>,
    listener: Option<JoinHandle<()>>,
    trigger: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    cycle_rx: mpsc::UnboundedReceiver<()>,
    /// Signalled by a listener whose line stopped working
    line_failed_tx: mpsc::UnboundedSender<()>,
    line_failed_rx: mpsc::UnboundedReceiver<()>,
    status_tx: Option<watch::Sender<DeliveryStatus>>,
}

impl DeliveryActor {
    fn init(&mut self) {
        match &self.interrupt {
            Some(line) => {
                debug!("Allocated interrupt line {}", line.name());
                self.rate = INTERRUPT_RATE;
                self.attach_interrupt();
            }
            None => {
                debug!("Interrupt allocation failed. Fallback to sampling.");
                self.rate = self.fallback_rate();
            }
        }
        if self.rate >= 0 {
            self.setup_timer();
            self.reset_timer();
        }
    }

    fn fallback_rate(&self) -> i32 {
        if self.config.default_rate > 0 {
            self.config.default_rate
        } else {
            warn!(
                "Invalid default sampling rate {}, using {}",
                self.config.default_rate, DEFAULT_SAMPLING_RATE
            );
            DEFAULT_SAMPLING_RATE
        }
    }

    async fn run(mut self, mut request_rx: mpsc::Receiver<Request>) {
        debug!("Delivery actor started ({})", self.mode());
        loop {
            let deadline = self.deadline;
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                request = request_rx.recv() => match request {
                    Some(Request::SetRate { rate, reply }) => {
                        let change = self.set_rate(rate);
                        let _ = reply.send(change);
                    }
                    Some(Request::Shutdown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.teardown().await;
                        return;
                    }
                },
                Some(()) = self.cycle_rx.recv() => self.cycle_complete(),
                Some(()) = self.line_failed_rx.recv() => self.interrupt_failed(),
                _ = timer => {
                    self.deadline = None;
                    self.trigger.notify_one();
                }
            }
        }
    }

    /// Sampling rate write. Order of effects follows the transition table.
    fn set_rate(&mut self, value: i32) -> RateChange {
        if value == self.rate {
            return RateChange::Unchanged;
        }
        // Can't switch to interrupt mode if it is not supported
        if value < 0 && self.interrupt.is_none() {
            debug!("No interrupt line, ignoring sampling rate {}", value);
            return RateChange::Rejected;
        }
        if value == 0 {
            debug!("Sampling rate 0 is not supported");
            return RateChange::Rejected;
        }

        let old = self.rate;
        self.rate = value;

        if old < 0 && value >= 0 {
            self.detach_interrupt();
            self.setup_timer();
        } else if old >= 0 && value < 0 {
            self.teardown_timer();
            self.attach_interrupt();
        }

        if value > 0 {
            self.reset_timer();
        }

        info!("New sampling rate: {} ({})", value, self.mode());
        self.publish();
        RateChange::Applied
    }

    /// Worker finished a cycle: the next poll is one period from now.
    fn cycle_complete(&mut self) {
        if self.timer_setup && self.rate > 0 {
            self.reset_timer();
        }
    }

    fn setup_timer(&mut self) {
        self.timer_setup = true;
        debug!("Timer set up");
    }

    fn reset_timer(&mut self) {
        if !self.timer_setup {
            return;
        }
        if let Some(period) = self.config.period(self.rate) {
            self.deadline = Some(Instant::now() + period);
        }
    }

    fn teardown_timer(&mut self) {
        self.deadline = None;
        self.timer_setup = false;
        debug!("Timer torn down");
    }

    fn attach_interrupt(&mut self) {
        let Some(line) = self.interrupt.clone() else {
            return;
        };
        let trigger = self.trigger.clone();
        let failed = self.line_failed_tx.clone();
        self.listener = Some(tokio::spawn(async move {
            loop {
                match line.wait().await {
                    Ok(()) => trigger.notify_one(),
                    Err(e) => {
                        warn!("Interrupt line {} failed: {}", line.name(), e);
                        let _ = failed.send(());
                        break;
                    }
                }
            }
        }));
        debug!("Interrupt handler attached");
    }

    /// The line is gone for good: release it and poll instead
    fn interrupt_failed(&mut self) {
        self.detach_interrupt();
        self.interrupt = None;
        if self.rate < 0 {
            self.rate = self.fallback_rate();
            self.setup_timer();
            self.reset_timer();
            warn!("Interrupt line lost, falling back to {}", self.mode());
        }
        self.publish();
    }

    fn detach_interrupt(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("Interrupt handler detached");
        }
    }

    async fn teardown(&mut self) {
        self.teardown_timer();
        self.detach_interrupt();

        let _ = self.stop_tx.send(true);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Delivery worker ended abnormally: {}", e);
            }
        }

        self.interrupt = None;
        self.publish();
        debug!("Delivery stopped");
    }

    fn mode(&self) -> DeliveryMode {
        if self.worker.is_none() {
            DeliveryMode::Disabled
        } else if self.rate < 0 {
            DeliveryMode::Interrupt
        } else {
            DeliveryMode::Polling {
                rate: self.rate as u32,
            }
        }
    }

    fn status(&self) -> DeliveryStatus {
        DeliveryStatus {
            mode: self.mode(),
            sampling_rate: self.rate,
            timer_period: if self.timer_setup {
                self.config.period(self.rate)
            } else {
                None
            },
            timer_armed: self.deadline.is_some(),
            interrupt_attached: self.listener.is_some(),
            has_interrupt: self.interrupt.is_some(),
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(self.status());
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    engine: SharedEngine,
    mut handler: Box<dyn ReportHandler>,
    trigger: Arc<Notify>,
    mut stop_rx: watch::Receiver<bool>,
    cycle_tx: mpsc::UnboundedSender<()>,
    debug: bool,
) {
    debug!("Delivery worker started");
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = trigger.notified() => {}
        }

        match engine.fetch_input_report().await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => {
                if debug {
                    debug!("Input report: {}", hex_dump(report.payload()));
                }
                handler.handle_report(report.payload());
            }
            // already logged by the engine; the next trigger tries again
            Err(_) => {}
        }

        if *stop_rx.borrow() {
            break;
        }
        let _ = cycle_tx.send(());
    }
    debug!("Delivery worker stopped");
}
