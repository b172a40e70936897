//! GPIO backend for the indicator LED and the L298N motor driver
//!
//! Pin numbers use BCM numbering. The motor enable line is driven with
//! rppal's software PWM so intermediate duty cycles are possible, but the
//! device logic only ever asks for fully on or fully off.

use rppal::gpio::{Gpio, Level, OutputPin};
use tracing::{debug, info};

use super::{ActuatorDriver, HardwareError, MotorDirection, MotorDrive};
use crate::config::PinConfig;

pub struct GpioActuators {
    indicator: OutputPin,
    indicator_active_high: bool,
    motor_enable: OutputPin,
    motor_in1: OutputPin,
    motor_in2: OutputPin,
    pwm_frequency_hz: f64,
}

impl GpioActuators {
    /// Claims all four output pins. Fails if the GPIO peripheral is not
    /// accessible or a pin is already in use.
    pub fn open(pins: &PinConfig) -> Result<Self, HardwareError> {
        let gpio = Gpio::new()?;

        let indicator = gpio.get(pins.indicator)?.into_output();
        let motor_enable = gpio.get(pins.motor_enable)?.into_output_low();
        let motor_in1 = gpio.get(pins.motor_in1)?.into_output_low();
        let motor_in2 = gpio.get(pins.motor_in2)?.into_output_low();

        info!(
            "GPIO ready: indicator={} (active {}), ENA={}, IN1={}, IN2={}",
            pins.indicator,
            if pins.indicator_active_high { "high" } else { "low" },
            pins.motor_enable,
            pins.motor_in1,
            pins.motor_in2
        );

        Ok(Self {
            indicator,
            indicator_active_high: pins.indicator_active_high,
            motor_enable,
            motor_in1,
            motor_in2,
            pwm_frequency_hz: pins.pwm_frequency_hz,
        })
    }
}

/// Physical level for a logical indicator state
pub(crate) fn indicator_level(on: bool, active_high: bool) -> Level {
    if on == active_high {
        Level::High
    } else {
        Level::Low
    }
}

impl ActuatorDriver for GpioActuators {
    fn set_indicator(&mut self, on: bool) -> Result<(), HardwareError> {
        self.indicator
            .write(indicator_level(on, self.indicator_active_high));
        Ok(())
    }

    fn set_motor(&mut self, drive: MotorDrive) -> Result<(), HardwareError> {
        match drive.direction {
            MotorDirection::Forward => {
                self.motor_in1.set_high();
                self.motor_in2.set_low();
            }
            MotorDirection::Stopped => {
                self.motor_in1.set_low();
                self.motor_in2.set_low();
            }
        }

        match drive.duty {
            0 => {
                self.motor_enable.clear_pwm()?;
                self.motor_enable.set_low();
            }
            u8::MAX => {
                self.motor_enable.clear_pwm()?;
                self.motor_enable.set_high();
            }
            _ => {
                self.motor_enable
                    .set_pwm_frequency(self.pwm_frequency_hz, drive.duty_fraction())?;
            }
        }

        debug!("Motor drive applied: {:?}", drive);
        Ok(())
    }
}
