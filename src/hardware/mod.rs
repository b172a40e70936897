//! # Hardware Abstraction
//!
//! Capability traits for the local I/O the agent drives, plus the concrete
//! backends behind them:
//!
//! ```text
//! hardware/
//! ├── gpio.rs       - rppal-backed indicator LED and L298N motor driver
//! ├── dht.rs        - DHT22 readings through the Linux IIO subsystem
//! └── simulated.rs  - host-only stand-ins used by `--simulate`
//! ```
//!
//! Actuator writes are best effort. Every setter returns a `Result` so the
//! caller can log a failed write, but the device logic never treats one as
//! fatal: the next command or heartbeat re-drives the pins anyway.

pub mod dht;
pub mod gpio;
pub mod simulated;

use std::fmt;

/// Errors raised by hardware backends
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// GPIO peripheral could not be opened or a pin could not be claimed
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    /// Sensor device node missing or unreadable
    #[error("Sensor I/O error: {0}")]
    SensorIo(#[from] std::io::Error),

    /// Sensor produced something that is not a number
    #[error("Malformed sensor value: {0}")]
    MalformedValue(String),
}

/// Direction lines of the H-bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    /// IN1 high, IN2 low
    Forward,
    /// Both direction lines low
    Stopped,
}

/// Complete drive configuration for the motor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorDrive {
    pub direction: MotorDirection,
    /// Enable-pin duty cycle, 0 (off) to 255 (always on)
    pub duty: u8,
}

impl MotorDrive {
    pub const FULL_FORWARD: MotorDrive = MotorDrive {
        direction: MotorDirection::Forward,
        duty: u8::MAX,
    };

    pub const STOPPED: MotorDrive = MotorDrive {
        direction: MotorDirection::Stopped,
        duty: 0,
    };

    /// Duty cycle as a fraction in `0.0..=1.0`
    pub fn duty_fraction(&self) -> f64 {
        f64::from(self.duty) / f64::from(u8::MAX)
    }
}

/// Output side of the board: indicator LED and motor driver
///
/// Implementations must be idempotent. Applying the same level twice simply
/// drives the pins again.
pub trait ActuatorDriver: Send {
    /// Switch the indicator. Polarity is the driver's concern.
    fn set_indicator(&mut self, on: bool) -> Result<(), HardwareError>;

    /// Apply direction lines and enable duty in one step
    fn set_motor(&mut self, drive: MotorDrive) -> Result<(), HardwareError>;
}

/// Result of a single humidity/temperature sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    Reading {
        /// Relative humidity in percent
        humidity: f32,
        /// Temperature in degrees Celsius
        temperature: f32,
    },
    /// Checksum failure, timeout or missing device
    Unavailable,
}

impl SensorReading {
    /// Builds a reading, collapsing non-finite values to `Unavailable`
    pub fn from_values(humidity: f32, temperature: f32) -> Self {
        if humidity.is_finite() && temperature.is_finite() {
            SensorReading::Reading {
                humidity,
                temperature,
            }
        } else {
            SensorReading::Unavailable
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReading::Reading {
                humidity,
                temperature,
            } => write!(f, "{:.1} %RH / {:.1} °C", humidity, temperature),
            SensorReading::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Input side of the board: the humidity/temperature transducer
pub trait SensorReader: Send {
    /// Take one sample. Failures are reported as `SensorReading::Unavailable`.
    fn read(&mut self) -> SensorReading;
}
