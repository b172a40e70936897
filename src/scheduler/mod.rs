//! Cooperative main loop
//!
//! Lifecycle as a statum typestate:
//!
//! ```text
//! DeviceLoop<Booting> ──boot()──► DeviceLoop<Running> ──run()──► shutdown
//! ```
//!
//! Each iteration of the running loop pumps inbound messages first, then
//! checks the Wi-Fi, broker, sensor and heartbeat timers in that order. Each
//! timer fires at most once per iteration. A short idle delay caps the loop
//! rate.

pub mod clock;
pub mod timer;

use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TimingConfig;
use crate::device::DeviceStateMachine;
use clock::Clock;
use timer::LoopTimers;

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Booting,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct DeviceLoop<S: LoopState> {
    device: DeviceStateMachine,
    timers: LoopTimers,
    clock: Arc<dyn Clock>,
    idle_delay: Duration,
}

/// What a single iteration did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub wifi_checked: bool,
    pub broker_checked: bool,
    pub sensor_published: bool,
    pub heartbeat_published: bool,
}

impl<S: LoopState> DeviceLoop<S> {
    pub fn device(&self) -> &DeviceStateMachine {
        &self.device
    }
}

impl DeviceLoop<Booting> {
    /// Timers start counting from now, so the first sensor publish happens one
    /// interval after the agent started, not after boot finished.
    pub fn create(device: DeviceStateMachine, timing: &TimingConfig, clock: Arc<dyn Clock>) -> Self {
        let timers = LoopTimers::starting_at(timing, clock.now_ms());
        Self::new(device, timers, clock, timing.idle_delay())
    }

    /// Power-on self test, first network association and first broker
    /// handshake. Failures are left to the watchdogs.
    pub fn boot(mut self) -> DeviceLoop<Running> {
        let identity = self.device.identity().clone();
        info!(
            "Booting {} with firmware {} in namespace {}",
            identity.device_id, identity.firmware_version, identity.namespace
        );
        for topic in self.device.topics().all() {
            info!("  topic {}", topic);
        }

        self.device.power_on();
        self.device.wifi_watchdog();
        self.device.connect_broker();

        info!("Boot complete, entering main loop");
        self.transition()
    }
}

impl DeviceLoop<Running> {
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            dispatched: self.device.pump_inbound(),
            ..TickReport::default()
        };

        let now = self.clock.now_ms();
        if self.timers.wifi.poll(now) {
            report.wifi_checked = true;
            self.device.wifi_watchdog();
        }
        if self.timers.broker.poll(now) {
            report.broker_checked = true;
            self.device.broker_watchdog();
        }
        if self.timers.sensor.poll(now) {
            report.sensor_published = true;
            self.device.publish_sensor();
        }
        if self.timers.heartbeat.poll(now) {
            report.heartbeat_published = true;
            self.device.publish_state();
        }
        report
    }

    /// Runs until `cancel` fires, then shuts the device down.
    pub fn run(mut self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let report = self.tick();
            if report != TickReport::default() {
                debug!("Tick: {:?}", report);
            }
            self.clock.sleep(self.idle_delay);
        }
        info!("Main loop stopped");
        self.device.shutdown();
    }
}
