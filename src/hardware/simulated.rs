//! Stand-in hardware for running the agent on a development host
//!
//! Value ranges follow the desk simulator used while bringing up the
//! dashboard: 17-28 °C and 35-75 %RH, drawn uniformly per sample.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{ActuatorDriver, HardwareError, MotorDrive, SensorReader, SensorReading};

/// Actuators that only report what they would have driven
#[derive(Debug, Default)]
pub struct SimulatedActuators {
    indicator: bool,
    motor: Option<MotorDrive>,
}

impl ActuatorDriver for SimulatedActuators {
    fn set_indicator(&mut self, on: bool) -> Result<(), HardwareError> {
        if self.indicator != on {
            info!("[sim] indicator pin {}", if on { "HIGH" } else { "LOW" });
        }
        self.indicator = on;
        Ok(())
    }

    fn set_motor(&mut self, drive: MotorDrive) -> Result<(), HardwareError> {
        if self.motor != Some(drive) {
            info!(
                "[sim] motor {:?} at duty {}/{}",
                drive.direction,
                drive.duty,
                u8::MAX
            );
        }
        self.motor = Some(drive);
        Ok(())
    }
}

pub struct SimulatedSensor {
    rng: StdRng,
    failure_rate: f64,
}

impl SimulatedSensor {
    /// `failure_rate` is the probability in `0.0..=1.0` that a sample fails
    pub fn new(failure_rate: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    #[cfg(test)]
    fn seeded(seed: u64, failure_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            failure_rate,
        }
    }
}

impl SensorReader for SimulatedSensor {
    fn read(&mut self) -> SensorReading {
        if self.rng.gen_bool(self.failure_rate) {
            return SensorReading::Unavailable;
        }
        let temperature = 20.0 + self.rng.gen_range(-3.0f32..8.0);
        let humidity = 50.0 + self.rng.gen_range(-15.0f32..25.0);
        SensorReading::from_values(humidity, temperature)
    }
}
