//! Full attach / deliver / detach cycle against a simulated device

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use iichid_map::usages::{self, desktop};
use iichid_map::{
    codes, AttachConfig, CallbackStatus, DeliveryMode, EventType, HidDevice, InputEvent,
    MapEntry, MapError, Phase, RateChange,
};
use iichid_transport::{
    DescriptorLayout, HardwareIdentity, NoInterrupts, ReportType, SimulatedDevice,
    TransportError,
};
use parking_lot::Mutex;
use tokio::time::timeout;

/// Mouse: 3 buttons + padding, X/Y relative bytes, no report ids
const MOUSE: &[u8] = &[
    0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, //
    0x05, 0x09, 0x19, 0x01, 0x29, 0x03, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x03,
    0x81, 0x02, //
    0x75, 0x05, 0x95, 0x01, 0x81, 0x01, //
    0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x15, 0x81, 0x25, 0x7F, 0x75, 0x08, 0x95, 0x02,
    0x81, 0x06, //
    0xC0,
];

fn device() -> Arc<SimulatedDevice> {
    let layout = DescriptorLayout {
        command_register: 0x0005,
        data_register: 0x0006,
        vendor_id: 0x04F3,
        product_id: 0x3058,
        ..Default::default()
    };
    Arc::new(SimulatedDevice::new(0x15, 0x0001, layout, MOUSE.to_vec()))
}

fn identity() -> HardwareIdentity {
    HardwareIdentity {
        address: 0x15,
        irq: Some(33),
        gpio_pin: None,
        descriptor_register: 0x0001,
        hardware_id: "PNP0C50".into(),
    }
}

fn table() -> Vec<MapEntry> {
    vec![
        MapEntry::key("BUTTONS", usages::button(1), codes::BTN_MOUSE).with_count(16),
        MapEntry::rel("X", usages::desktop(desktop::X), codes::REL_X).required(),
        MapEntry::rel("Y", usages::desktop(desktop::Y), codes::REL_Y).required(),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_reports_become_events() {
    let dev = device();
    let hid = HidDevice::attach(
        dev.clone(),
        identity(),
        &dev.interrupt(),
        table(),
        AttachConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(hid.status().mode, DeliveryMode::Interrupt);
    assert_eq!(hid.descriptor().vendor_id(), 0x04F3);
    assert!(hid.declaration().supports(EventType::Rel, codes::REL_Y));

    let mut events = Box::pin(hid.events());
    dev.queue_input(&[0b001, 0x03, 0xFD]);

    let mut got = Vec::new();
    while got.last().map_or(true, |e: &InputEvent| !e.is_syn_report()) {
        let event = timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        got.push(event);
    }
    assert_eq!(
        got,
        vec![
            InputEvent::new(EventType::Key, codes::BTN_LEFT, 1),
            InputEvent::new(EventType::Key, codes::BTN_RIGHT, 0),
            InputEvent::new(EventType::Key, codes::BTN_MIDDLE, 0),
            InputEvent::new(EventType::Rel, codes::REL_X, 3),
            InputEvent::new(EventType::Rel, codes::REL_Y, -3),
            InputEvent::syn_report(),
        ]
    );

    hid.detach().await.unwrap();
    // every sender is gone once detached
    assert!(events.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_interrupt_falls_back_to_polling() {
    let dev = device();
    let hid = HidDevice::attach(
        dev.clone(),
        identity(),
        &NoInterrupts,
        table(),
        AttachConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(hid.status().mode, DeliveryMode::Polling { rate: 60 });
    assert_eq!(hid.set_sampling_rate(-1).await.unwrap(), RateChange::Rejected);
    assert_eq!(hid.sampling_rate(), 60);

    let mut rx = hid.subscribe();
    dev.queue_input(&[0, 1, 1]);
    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, InputEvent::new(EventType::Key, codes::BTN_LEFT, 0));

    hid.detach().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_missing_required_usage_fails_attach() {
    let dev = device();
    let mut entries = table();
    entries.push(
        MapEntry::abs(
            "PRESSURE",
            usages::digitizer(usages::digitizer::TIP_PRESSURE),
            codes::ABS_PRESSURE,
        )
        .required(),
    );
    let result = HidDevice::attach(dev.clone(), identity(), &NoInterrupts, entries, AttachConfig::default()).await;
    assert!(matches!(result, Err(MapError::MissingCapability { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_broken_descriptor_fails_attach() {
    let dev = device();
    dev.corrupt_descriptor_version(0x0110);
    let result = HidDevice::attach(dev.clone(), identity(), &NoInterrupts, table(), AttachConfig::default()).await;
    assert!(matches!(
        result,
        Err(MapError::Transport(TransportError::MalformedDescriptor(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_detach_runs_callbacks_after_drain() {
    let phases: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = phases.clone();
    let complete = move |phase: Phase<'_>| {
        seen.lock().push(match phase {
            Phase::Attaching(_) => "attaching",
            Phase::Running { .. } => "running",
            Phase::Detaching => "detaching",
        });
        CallbackStatus::Continue
    };

    let dev = device();
    let mut entries = table();
    entries.push(MapEntry::completion("COMPLETE", Arc::new(complete)));
    let hid = HidDevice::attach(dev.clone(), identity(), &dev.interrupt(), entries, AttachConfig::default())
        .await
        .unwrap();
    let mut rx = hid.subscribe();

    dev.queue_input(&[0, 0, 0]);
    loop {
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        if event.is_syn_report() {
            break;
        }
    }

    hid.detach().await.unwrap();
    assert_eq!(*phases.lock(), vec!["attaching", "running", "detaching"]);
}

#[tokio::test(start_paused = true)]
async fn test_get_report_passthrough() {
    let dev = device();
    dev.set_report(ReportType::Feature, 2, vec![0x11, 0x22]);
    let hid = HidDevice::attach(dev.clone(), identity(), &NoInterrupts, table(), AttachConfig::default())
        .await
        .unwrap();

    assert_eq!(
        hid.get_report(ReportType::Feature, 2, 2).await.unwrap(),
        vec![0x11, 0x22]
    );

    dev.override_echoed_id(4);
    assert!(matches!(
        hid.get_report(ReportType::Feature, 2, 2).await,
        Err(MapError::Transport(TransportError::BadMessage { .. }))
    ));

    hid.detach().await.unwrap();
}
