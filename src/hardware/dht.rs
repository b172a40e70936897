//! DHT22 readings through the kernel's IIO `dht11` driver
//!
//! With `dtoverlay=dht11,gpiopin=4` the kernel handles the single-wire timing
//! and exposes milli-unit values as sysfs attributes. A checksum failure or
//! bus timeout shows up as an I/O error on read, which maps to
//! [`SensorReading::Unavailable`].

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{HardwareError, SensorReader, SensorReading};

const HUMIDITY_ATTR: &str = "in_humidityrelative_input";
const TEMPERATURE_ATTR: &str = "in_temp_input";

pub struct IioDhtSensor {
    device_dir: PathBuf,
}

impl IioDhtSensor {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    fn sample(&self) -> Result<(f32, f32), HardwareError> {
        let humidity = read_milli(&self.device_dir.join(HUMIDITY_ATTR))?;
        let temperature = read_milli(&self.device_dir.join(TEMPERATURE_ATTR))?;
        Ok((humidity, temperature))
    }
}

/// Reads a sysfs attribute holding an integer in thousandths
fn read_milli(path: &Path) -> Result<f32, HardwareError> {
    let raw = fs::read_to_string(path)?;
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| HardwareError::MalformedValue(format!("{}: {:?}", path.display(), raw)))?;
    Ok(value as f32 / 1000.0)
}

impl SensorReader for IioDhtSensor {
    fn read(&mut self) -> SensorReading {
        match self.sample() {
            Ok((humidity, temperature)) => {
                let reading = SensorReading::from_values(humidity, temperature);
                debug!("DHT22 sample: {}", reading);
                reading
            }
            Err(e) => {
                warn!("DHT22 read failed: {}", e);
                SensorReading::Unavailable
            }
        }
    }
}
