//! # Device State Machine
//!
//! Owns the actuator state and every collaborator the device talks to, and
//! implements the behaviors the scheduler triggers:
//!
//! ```text
//!                 ┌──────────────► ActuatorDriver (indicator, motor)
//! Scheduler ──► DeviceStateMachine ──► SensorReader
//!   ▲             │    ▲
//!   │             │    └── handle_command ◄── inbound pump
//!   │             ▼
//!   └──────── MessageChannel ◄──► broker       NetworkLink (watchdog)
//! ```
//!
//! ## Failure Model
//!
//! Nothing in here is fatal. Hardware writes are logged when they fail,
//! publishes are skipped while there is no session, sensor failures are
//! reported as `null` values, malformed commands are dropped, and
//! connectivity problems wait for the next watchdog interval.

pub mod command;
pub mod telemetry;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::hardware::{ActuatorDriver, MotorDrive, SensorReader};
use crate::mqtt::{MessageChannel, TopicSet, WillMessage};
use crate::network::{self, NetworkLink, ReconnectPolicy};
use crate::scheduler::clock::Clock;
use command::{CommandMessage, FieldRequest, MAX_COMMAND_BYTES};
use telemetry::{PresenceRecord, SensorRecord, StateRecord};

/// Length of each phase of the power-on blink
const SELF_TEST_BLINK: Duration = Duration::from_millis(150);

/// Who the device is and where it publishes. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub firmware_version: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorState {
    pub indicator_on: bool,
    pub motor_on: bool,
}

impl Default for ActuatorState {
    /// Indicator lit, motor stopped
    fn default() -> Self {
        Self {
            indicator_on: true,
            motor_on: false,
        }
    }
}

/// The external collaborators, handed over once at construction
pub struct Peripherals {
    pub actuators: Box<dyn ActuatorDriver>,
    pub sensor: Box<dyn SensorReader>,
    pub link: Box<dyn NetworkLink>,
    pub channel: Box<dyn MessageChannel>,
}

/// What became of an inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Payload could not be parsed; nothing happened
    Rejected,
    /// Valid payload without `light` or `fan`; nothing happened
    NoRecognizedField,
    /// At least one recognized key was present and state was republished
    Applied,
}

pub struct DeviceStateMachine {
    identity: DeviceIdentity,
    topics: TopicSet,
    state: ActuatorState,
    actuators: Box<dyn ActuatorDriver>,
    sensor: Box<dyn SensorReader>,
    link: Box<dyn NetworkLink>,
    channel: Box<dyn MessageChannel>,
    clock: Arc<dyn Clock>,
    reconnect: ReconnectPolicy,
}

impl fmt::Debug for DeviceStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStateMachine")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("connected", &self.channel.is_connected())
            .finish_non_exhaustive()
    }
}

impl DeviceStateMachine {
    pub fn new(
        identity: DeviceIdentity,
        peripherals: Peripherals,
        clock: Arc<dyn Clock>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        let topics = TopicSet::for_namespace(&identity.namespace);
        Self {
            identity,
            topics,
            state: ActuatorState::default(),
            actuators: peripherals.actuators,
            sensor: peripherals.sensor,
            link: peripherals.link,
            channel: peripherals.channel,
            clock,
            reconnect,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn is_broker_connected(&self) -> bool {
        self.channel.is_connected()
    }

    // ---------------------------------------------------------------------
    // Actuators
    // ---------------------------------------------------------------------

    pub fn set_indicator(&mut self, on: bool) {
        self.state.indicator_on = on;
        if let Err(e) = self.actuators.set_indicator(on) {
            error!("Indicator write failed: {}", e);
        }
        info!("Indicator {}", if on { "ON" } else { "OFF" });
    }

    pub fn set_motor(&mut self, on: bool) {
        self.state.motor_on = on;
        let drive = if on {
            MotorDrive::FULL_FORWARD
        } else {
            MotorDrive::STOPPED
        };
        if let Err(e) = self.actuators.set_motor(drive) {
            error!("Motor write failed: {}", e);
        }
        info!("Motor {}", if on { "ON" } else { "OFF" });
    }

    /// Blink the indicator once so a technician can see the board came up,
    /// then apply the initial actuator state.
    pub fn power_on(&mut self) {
        for level in [true, false] {
            if let Err(e) = self.actuators.set_indicator(level) {
                warn!("Self-test blink failed: {}", e);
            }
            self.clock.sleep(SELF_TEST_BLINK);
        }
        let initial = ActuatorState::default();
        self.set_indicator(initial.indicator_on);
        self.set_motor(initial.motor_on);
    }

    // ---------------------------------------------------------------------
    // Telemetry
    // ---------------------------------------------------------------------

    fn publish_record<T: Serialize>(&mut self, topic: &str, record: &T, retained: bool) {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode record for {}: {}", topic, e);
                return;
            }
        };
        match self.channel.publish(topic, &payload, retained) {
            Ok(()) => info!("Published {} {}", topic, String::from_utf8_lossy(&payload)),
            Err(e) => warn!("Publish to {} failed: {}", topic, e),
        }
    }

    pub fn publish_presence(&mut self, online: bool) {
        if !self.channel.is_connected() {
            return;
        }
        let record = PresenceRecord::new(online, self.clock.uptime_secs());
        let topic = self.topics.system_online.clone();
        self.publish_record(&topic, &record, true);
    }

    pub fn publish_state(&mut self) {
        if !self.channel.is_connected() {
            return;
        }
        let ts = self.clock.now_ms();
        let rssi = self.link.rssi();
        let topic = self.topics.device_state.clone();
        let fw = self.identity.firmware_version.clone();
        let record = StateRecord {
            ts,
            light: self.state.indicator_on.into(),
            fan: self.state.motor_on.into(),
            rssi,
            fw: &fw,
        };
        self.publish_record(&topic, &record, true);
    }

    pub fn publish_sensor(&mut self) {
        if !self.channel.is_connected() {
            return;
        }
        let reading = self.sensor.read();
        let record = SensorRecord::from_reading(self.clock.now_ms(), reading);
        let topic = self.topics.sensor_data.clone();
        self.publish_record(&topic, &record, false);
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    pub fn handle_command(&mut self, payload: &[u8]) -> CommandOutcome {
        let command = match CommandMessage::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                debug!("Discarding command: {}", e);
                return CommandOutcome::Rejected;
            }
        };

        if let Some(request) = &command.light {
            match request.action() {
                Some(action) => self.set_indicator(action.apply(self.state.indicator_on)),
                None => warn_unrecognized("light", request),
            }
        }
        if let Some(request) = &command.fan {
            match request.action() {
                Some(action) => self.set_motor(action.apply(self.state.motor_on)),
                None => warn_unrecognized("fan", request),
            }
        }

        if command.has_recognized_field() {
            self.publish_state();
            CommandOutcome::Applied
        } else {
            CommandOutcome::NoRecognizedField
        }
    }

    /// Drains the broker session and dispatches commands addressed to us.
    /// Returns the number of messages received.
    pub fn pump_inbound(&mut self) -> usize {
        if !self.channel.is_connected() {
            return 0;
        }
        let messages = self.channel.poll_inbound();
        for message in &messages {
            info!("Received {}", message);
            if message.topic != self.topics.device_command {
                debug!("No handler for topic {}", message.topic);
            } else if message.payload.len() > MAX_COMMAND_BYTES {
                warn!(
                    "Dropping {} byte command, limit is {} bytes",
                    message.payload.len(),
                    MAX_COMMAND_BYTES
                );
            } else {
                self.handle_command(&message.payload);
            }
        }
        messages.len()
    }

    // ---------------------------------------------------------------------
    // Connectivity
    // ---------------------------------------------------------------------

    pub fn will_message(&self) -> WillMessage {
        let payload = serde_json::to_vec(&PresenceRecord::will())
            .unwrap_or_else(|_| br#"{"status":"disconnected","online":false}"#.to_vec());
        WillMessage {
            topic: self.topics.system_online.clone(),
            payload,
            retained: true,
        }
    }

    /// Reassociates if the wireless link is down. Blocks for the bounded
    /// reconnect window at most.
    pub fn wifi_watchdog(&mut self) {
        if self.link.is_associated() {
            return;
        }
        if let Err(e) = network::associate(self.link.as_mut(), self.clock.as_ref(), &self.reconnect)
        {
            warn!("Network reconnect failed: {}", e);
        }
    }

    /// Re-establishes the broker session if the link is up but the session is
    /// gone.
    pub fn broker_watchdog(&mut self) {
        if !self.link.is_associated() || self.channel.is_connected() {
            return;
        }
        self.connect_broker();
    }

    /// Connect-with-will handshake followed by subscribe, online presence and
    /// a fresh state record, in that order. Returns whether a session is up.
    pub fn connect_broker(&mut self) -> bool {
        if !self.link.is_associated() {
            debug!("Skipping broker connect, network is down");
            return false;
        }

        let will = self.will_message();
        if let Err(e) = self.channel.connect(&will) {
            warn!("Broker connect failed: {}", e);
            return false;
        }
        info!("Broker connected");

        let command_topic = self.topics.device_command.clone();
        if let Err(e) = self.channel.subscribe(&command_topic) {
            warn!("Subscribe to {} failed, dropping session: {}", command_topic, e);
            self.channel.disconnect();
            return false;
        }
        info!("Subscribed to {}", command_topic);

        self.publish_presence(true);
        self.publish_state();
        true
    }

    /// Announces the device as offline, closes the session cleanly and stops
    /// the motor.
    pub fn shutdown(&mut self) {
        if self.channel.is_connected() {
            self.publish_presence(false);
            self.channel.disconnect();
        }
        self.set_motor(false);
    }
}

fn warn_unrecognized(field: &str, request: &FieldRequest) {
    if let FieldRequest::Unrecognized(value) = request {
        warn!("Ignoring unknown {} action {}", field, value);
    }
}
