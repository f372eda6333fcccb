//! In-memory HID over I2C device
//!
//! Answers bus transactions the way a real device would: HID descriptor at
//! its discovery register, report descriptor, queued input reports and
//! GET_REPORT responses. Used by the test suites and the `simulate` command.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::delivery::InterruptLine;
use crate::error::TransportError;
use crate::protocol::{DescriptorLayout, GetReportFrame, LENGTH_PREFIX, REPORT_ID_ESCAPE};
use crate::rdesc::ReportDescriptor;
use crate::types::ReportType;
use crate::I2cBus;
use zerocopy::IntoBytes;

/// Level-style interrupt line that can be fired from anywhere.
///
/// Fires that happen while nobody is waiting collapse into one.
#[derive(Debug, Default)]
pub struct SimulatedInterrupt {
    notify: Notify,
}

impl SimulatedInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl InterruptLine for SimulatedInterrupt {
    async fn wait(&self) -> Result<(), TransportError> {
        self.notify.notified().await;
        Ok(())
    }

    fn name(&self) -> String {
        "simulated".to_string()
    }
}

#[derive(Debug, Default)]
struct SimState {
    descriptor: Vec<u8>,
    report_descriptor: Vec<u8>,
    input_queue: VecDeque<Vec<u8>>,
    reports: HashMap<(ReportType, u8), Vec<u8>>,
    pending_failures: usize,
    echo_override: Option<u16>,
    /// Only the newest transaction is kept
    last_transfer: Option<(Vec<u8>, usize)>,
    transfer_count: usize,
}

/// A device sitting at one bus address
pub struct SimulatedDevice {
    address: u16,
    descriptor_register: u16,
    layout: DescriptorLayout,
    state: Mutex<SimState>,
    interrupt: Arc<SimulatedInterrupt>,
}

impl SimulatedDevice {
    /// Create a device serving `report_descriptor`.
    ///
    /// The report descriptor length is filled in from the bytes; a zero
    /// `max_input_length` is replaced by the size the descriptor implies.
    pub fn new(
        address: u16,
        descriptor_register: u16,
        mut layout: DescriptorLayout,
        report_descriptor: Vec<u8>,
    ) -> Self {
        layout.report_desc_length = report_descriptor.len() as u16;
        if layout.max_input_length == 0 {
            let size = ReportDescriptor::parse(&report_descriptor).input_report_size();
            layout.max_input_length = (size + LENGTH_PREFIX) as u16;
        }

        let state = SimState {
            descriptor: layout.build().as_bytes().to_vec(),
            report_descriptor,
            ..Default::default()
        };

        Self {
            address,
            descriptor_register,
            layout,
            state: Mutex::new(state),
            interrupt: Arc::new(SimulatedInterrupt::new()),
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn interrupt(&self) -> Arc<SimulatedInterrupt> {
        self.interrupt.clone()
    }

    /// Queue an input report (payload without length prefix) and raise the
    /// interrupt line.
    pub fn queue_input(&self, payload: &[u8]) {
        self.state.lock().input_queue.push_back(payload.to_vec());
        self.interrupt.fire();
    }

    pub fn pending_inputs(&self) -> usize {
        self.state.lock().input_queue.len()
    }

    /// Payload returned by GET_REPORT for (type, id)
    pub fn set_report(&self, report_type: ReportType, id: u8, payload: Vec<u8>) {
        self.state.lock().reports.insert((report_type, id), payload);
    }

    /// Make the next transaction fail with a bus error
    pub fn fail_next_transfer(&self) {
        self.state.lock().pending_failures += 1;
    }

    /// Echo this id in GET_REPORT responses instead of the requested one
    pub fn override_echoed_id(&self, id: u16) {
        self.state.lock().echo_override = Some(id);
    }

    /// Overwrite the version field of the HID descriptor image
    pub fn corrupt_descriptor_version(&self, version: u16) {
        let mut state = self.state.lock();
        state.descriptor[2..4].copy_from_slice(&version.to_le_bytes());
    }

    /// Most recent (write bytes, read length) pair
    pub fn last_transfer(&self) -> Option<(Vec<u8>, usize)> {
        self.state.lock().last_transfer.clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().transfer_count
    }

    fn respond(&self, state: &mut SimState, write: &[u8]) -> Result<Vec<u8>, TransportError> {
        let register = match write {
            [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
            _ => {
                return Err(TransportError::Io(
                    "write too short for a register address".into(),
                ))
            }
        };

        if register == self.descriptor_register {
            return Ok(state.descriptor.clone());
        }
        if register == self.layout.report_desc_register {
            return Ok(state.report_descriptor.clone());
        }
        if register == self.layout.input_register {
            return Ok(match state.input_queue.pop_front() {
                Some(payload) => {
                    let mut out = ((payload.len() + LENGTH_PREFIX) as u16).to_le_bytes().to_vec();
                    out.extend_from_slice(&payload);
                    out
                }
                None => vec![0, 0],
            });
        }
        if register == self.layout.command_register {
            let (report_type, id) = GetReportFrame::decode(write).ok_or_else(|| {
                TransportError::Io(format!("unsupported command {:02x?}", write))
            })?;
            let payload = state
                .reports
                .get(&(report_type, id))
                .cloned()
                .unwrap_or_default();
            let echoed = state.echo_override.unwrap_or(id as u16);
            let id_bytes = if id >= REPORT_ID_ESCAPE {
                echoed.to_le_bytes().to_vec()
            } else {
                vec![echoed as u8]
            };

            let total = LENGTH_PREFIX + id_bytes.len() + payload.len();
            let mut out = (total as u16).to_le_bytes().to_vec();
            out.extend_from_slice(&id_bytes);
            out.extend_from_slice(&payload);
            return Ok(out);
        }

        trace!("Read from unmapped register 0x{:04x}", register);
        Ok(Vec::new())
    }
}

#[async_trait]
impl I2cBus for SimulatedDevice {
    async fn transfer(
        &self,
        address: u16,
        write: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        state.last_transfer = Some((write.to_vec(), read_len));
        state.transfer_count += 1;

        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(TransportError::Io("injected bus failure".into()));
        }
        if address != self.address {
            return Err(TransportError::Io(format!(
                "no device acknowledged address 0x{:02x}",
                address
            )));
        }

        let mut out = self.respond(&mut state, write)?;
        out.resize(read_len, 0);
        Ok(out)
    }

    fn name(&self) -> String {
        format!("sim@0x{:02x}", self.address)
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("address", &self.address)
            .field("descriptor_register", &self.descriptor_register)
            .finish_non_exhaustive()
    }
}
