//! Deterministic fakes for unit tests
//!
//! Every fake hands out an `Arc<Mutex<_>>` handle to its internal state so a
//! test can script behavior and inspect what the device did after the fake
//! has been boxed into the state machine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{DeviceIdentity, DeviceStateMachine, Peripherals};
use crate::hardware::{ActuatorDriver, HardwareError, MotorDrive, SensorReader, SensorReading};
use crate::mqtt::{ChannelError, InboundMessage, MessageChannel, WillMessage};
use crate::network::{LinkError, NetworkLink, ReconnectPolicy};
use crate::scheduler::clock::Clock;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to, or when something sleeps on it
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorWrite {
    Indicator(bool),
    Motor(MotorDrive),
}

#[derive(Debug, Default)]
pub struct ActuatorLog {
    pub writes: Vec<ActuatorWrite>,
    pub fail_writes: bool,
}

pub struct FakeActuators {
    log: Arc<Mutex<ActuatorLog>>,
}

impl FakeActuators {
    pub fn new() -> (Self, Arc<Mutex<ActuatorLog>>) {
        let log = Arc::new(Mutex::new(ActuatorLog::default()));
        (Self { log: log.clone() }, log)
    }

    fn record(&mut self, write: ActuatorWrite) -> Result<(), HardwareError> {
        let mut log = self.log.lock().unwrap();
        log.writes.push(write);
        if log.fail_writes {
            Err(HardwareError::MalformedValue("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

impl ActuatorDriver for FakeActuators {
    fn set_indicator(&mut self, on: bool) -> Result<(), HardwareError> {
        self.record(ActuatorWrite::Indicator(on))
    }

    fn set_motor(&mut self, drive: MotorDrive) -> Result<(), HardwareError> {
        self.record(ActuatorWrite::Motor(drive))
    }
}

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SensorScript {
    pub readings: VecDeque<SensorReading>,
    pub reads: usize,
}

/// Replays queued readings, `Unavailable` once the queue is empty
pub struct ScriptedSensor {
    script: Arc<Mutex<SensorScript>>,
}

impl ScriptedSensor {
    pub fn new() -> (Self, Arc<Mutex<SensorScript>>) {
        let script = Arc::new(Mutex::new(SensorScript::default()));
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl SensorReader for ScriptedSensor {
    fn read(&mut self) -> SensorReading {
        let mut script = self.script.lock().unwrap();
        script.reads += 1;
        script
            .readings
            .pop_front()
            .unwrap_or(SensorReading::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Network link
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LinkState {
    pub associated: bool,
    pub rssi: i32,
    pub begin_calls: u32,
    pub reject_begin: bool,
    /// After `begin`, report unassociated for this many checks, then
    /// associate. `None` never associates.
    pub associate_after_checks: Option<u32>,
    pending: bool,
    checks_since_begin: u32,
}

pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    pub fn new(associated: bool) -> (Self, Arc<Mutex<LinkState>>) {
        let state = Arc::new(Mutex::new(LinkState {
            associated,
            rssi: -55,
            begin_calls: 0,
            reject_begin: false,
            associate_after_checks: Some(0),
            pending: false,
            checks_since_begin: 0,
        }));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl NetworkLink for FakeLink {
    fn network_name(&self) -> &str {
        "test-ssid"
    }

    fn is_associated(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.associated {
            return true;
        }
        if state.pending {
            if let Some(limit) = state.associate_after_checks {
                if state.checks_since_begin >= limit {
                    state.associated = true;
                    state.pending = false;
                    return true;
                }
            }
            state.checks_since_begin += 1;
        }
        false
    }

    fn rssi(&mut self) -> i32 {
        let state = self.state.lock().unwrap();
        if state.associated {
            state.rssi
        } else {
            0
        }
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        state.begin_calls += 1;
        if state.reject_begin {
            return Err(LinkError::Rejected("secrets required".into()));
        }
        state.pending = true;
        state.checks_since_begin = 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connect(WillMessage),
    Subscribe(String),
    Publish(Published),
    Disconnect,
}

#[derive(Debug, Default)]
pub struct ChannelLog {
    pub connected: bool,
    pub refuse_connect: bool,
    pub refuse_subscribe: bool,
    pub events: Vec<ChannelEvent>,
    pub inbound: VecDeque<InboundMessage>,
}

impl ChannelLog {
    /// Simulates the broker dropping the session
    pub fn drop_session(&mut self) {
        self.connected = false;
    }
}

pub struct FakeChannel {
    log: Arc<Mutex<ChannelLog>>,
}

impl FakeChannel {
    pub fn new(connected: bool) -> (Self, Arc<Mutex<ChannelLog>>) {
        let log = Arc::new(Mutex::new(ChannelLog {
            connected,
            ..ChannelLog::default()
        }));
        (Self { log: log.clone() }, log)
    }
}

impl MessageChannel for FakeChannel {
    fn is_connected(&self) -> bool {
        self.log.lock().unwrap().connected
    }

    fn connect(&mut self, will: &WillMessage) -> Result<(), ChannelError> {
        let mut log = self.log.lock().unwrap();
        log.events.push(ChannelEvent::Connect(will.clone()));
        if log.refuse_connect {
            return Err(ChannelError::Refused("NotAuthorized".into()));
        }
        log.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        let mut log = self.log.lock().unwrap();
        if !log.connected {
            return Err(ChannelError::NotConnected);
        }
        if log.refuse_subscribe {
            return Err(ChannelError::Refused("subscription rejected".into()));
        }
        log.events.push(ChannelEvent::Subscribe(topic.to_string()));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), ChannelError> {
        let mut log = self.log.lock().unwrap();
        if !log.connected {
            return Err(ChannelError::NotConnected);
        }
        log.events.push(ChannelEvent::Publish(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retained,
        }));
        Ok(())
    }

    fn poll_inbound(&mut self) -> Vec<InboundMessage> {
        self.log.lock().unwrap().inbound.drain(..).collect()
    }

    fn disconnect(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.events.push(ChannelEvent::Disconnect);
        log.connected = false;
    }
}

// ---------------------------------------------------------------------------
// Assembled device
// ---------------------------------------------------------------------------

pub fn test_identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "roomnode_test".to_string(),
        firmware_version: "roomnode-test".to_string(),
        namespace: "lab/room1".to_string(),
    }
}

/// A device wired to fakes, plus handles to all of them
pub struct TestRig {
    pub device: DeviceStateMachine,
    pub clock: ManualClock,
    pub actuators: Arc<Mutex<ActuatorLog>>,
    pub sensor: Arc<Mutex<SensorScript>>,
    pub link: Arc<Mutex<LinkState>>,
    pub channel: Arc<Mutex<ChannelLog>>,
}

impl TestRig {
    fn build(broker_connected: bool) -> Self {
        let clock = ManualClock::new();
        let (actuators, actuator_log) = FakeActuators::new();
        let (sensor, sensor_script) = ScriptedSensor::new();
        let (link, link_state) = FakeLink::new(true);
        let (channel, channel_log) = FakeChannel::new(broker_connected);

        let device = DeviceStateMachine::new(
            test_identity(),
            Peripherals {
                actuators: Box::new(actuators),
                sensor: Box::new(sensor),
                link: Box::new(link),
                channel: Box::new(channel),
            },
            Arc::new(clock.clone()),
            ReconnectPolicy::default(),
        );

        Self {
            device,
            clock,
            actuators: actuator_log,
            sensor: sensor_script,
            link: link_state,
            channel: channel_log,
        }
    }

    /// Network associated and broker session up
    pub fn connected() -> Self {
        Self::build(true)
    }

    /// Network associated, no broker session yet
    pub fn disconnected() -> Self {
        Self::build(false)
    }

    /// Shared handles that outlive moving `device` somewhere else
    pub fn handles(&self) -> RigHandles {
        RigHandles {
            clock: self.clock.clone(),
            link: self.link.clone(),
            channel: self.channel.clone(),
        }
    }

    pub fn actuator_writes(&self) -> Vec<ActuatorWrite> {
        self.actuators.lock().unwrap().writes.clone()
    }

    pub fn channel_events(&self) -> Vec<ChannelEvent> {
        self.channel.lock().unwrap().events.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.channel_events()
            .into_iter()
            .filter_map(|event| match event {
                ChannelEvent::Publish(p) if p.topic == topic => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Decoded state records, oldest first
    pub fn state_publishes(&self) -> Vec<serde_json::Value> {
        let topic = self.device.topics().device_state.clone();
        self.published_on(&topic)
            .iter()
            .map(Published::json)
            .collect()
    }

    pub fn push_reading(&self, reading: SensorReading) {
        self.sensor.lock().unwrap().readings.push_back(reading);
    }

    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.channel
            .lock()
            .unwrap()
            .inbound
            .push_back(InboundMessage::from_topic(topic, payload.to_vec()));
    }
}

#[derive(Clone)]
pub struct RigHandles {
    pub clock: ManualClock,
    pub link: Arc<Mutex<LinkState>>,
    pub channel: Arc<Mutex<ChannelLog>>,
}

impl RigHandles {
    pub fn channel_events(&self) -> Vec<ChannelEvent> {
        self.channel.lock().unwrap().events.clone()
    }

    pub fn clear_channel_events(&self) {
        self.channel.lock().unwrap().events.clear();
    }

    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.channel
            .lock()
            .unwrap()
            .inbound
            .push_back(InboundMessage::from_topic(topic, payload.to_vec()));
    }
}
