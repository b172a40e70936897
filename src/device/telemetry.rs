//! Outbound JSON records
//!
//! Field names are part of the dashboard contract: `ts`, `humidity`, `temp`,
//! `light`, `fan`, `rssi`, `fw`, `status`, `online`, `uptime`.

use serde::Serialize;

use crate::hardware::SensorReading;

/// Rounds to one decimal place, computed in `f64` so the JSON stays short
pub fn round_one_decimal(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

/// Sample published on `<ns>/sensor/data`. A failed read still produces a
/// record; the value fields are then serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub ts: u64,
    pub humidity: Option<f64>,
    #[serde(rename = "temp")]
    pub temperature: Option<f64>,
}

impl SensorRecord {
    pub fn from_reading(ts: u64, reading: SensorReading) -> Self {
        match reading {
            SensorReading::Reading {
                humidity,
                temperature,
            } => SensorRecord {
                ts,
                humidity: Some(round_one_decimal(humidity)),
                temperature: Some(round_one_decimal(temperature)),
            },
            SensorReading::Unavailable => SensorRecord {
                ts,
                humidity: None,
                temperature: None,
            },
        }
    }
}

/// Retained snapshot on `<ns>/device/state`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord<'a> {
    pub ts: u64,
    pub light: SwitchState,
    pub fan: SwitchState,
    pub rssi: i32,
    pub fw: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Connected,
    Disconnected,
}

/// Retained liveness record on `<ns>/sys/online`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

impl PresenceRecord {
    pub fn new(online: bool, uptime_secs: u64) -> Self {
        PresenceRecord {
            status: if online {
                PresenceStatus::Connected
            } else {
                PresenceStatus::Disconnected
            },
            online,
            uptime: Some(uptime_secs),
        }
    }

    /// Payload the broker publishes on our behalf after an unclean drop.
    /// Carries no uptime since it is registered before it could be known.
    pub fn will() -> Self {
        PresenceRecord {
            status: PresenceStatus::Disconnected,
            online: false,
            uptime: None,
        }
    }
}
