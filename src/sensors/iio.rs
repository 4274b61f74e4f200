//! DHT11 temperature/humidity probe through the Linux IIO driver.
//!
//! With `dtoverlay=dht11` the kernel exposes the probe as an IIO device:
//! `in_temp_input` in millidegrees Celsius and `in_humidityrelative_input`
//! in thousandths of a percent. The one-wire protocol drops reads now and
//! then; the driver reports those as `EIO` or `ETIMEDOUT`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ClimateSensor, SensorError};
use crate::reading::RawClimate;

pub const DEFAULT_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

const TEMPERATURE_CHANNEL: &str = "in_temp_input";
const HUMIDITY_CHANNEL: &str = "in_humidityrelative_input";

#[derive(Debug)]
pub struct IioClimateSensor {
    device: PathBuf,
}

impl IioClimateSensor {
    pub fn open<P: Into<PathBuf>>(device: P) -> Result<IioClimateSensor, SensorError> {
        let device = device.into();

        let has_channel = [TEMPERATURE_CHANNEL, HUMIDITY_CHANNEL]
            .iter()
            .any(|channel| device.join(channel).is_file());
        if !has_channel {
            return Err(SensorError::Unavailable(format!(
                "no climate channels under {}",
                device.display()
            )));
        }

        tracing::info!(device = %device.display(), "climate sensor opened");
        Ok(IioClimateSensor { device })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    async fn read_channel(&self, channel: &str) -> Result<f64, SensorError> {
        let raw = tokio::fs::read_to_string(self.device.join(channel)).await?;
        let milli: i64 = raw
            .trim()
            .parse()
            .map_err(|_| SensorError::Malformed(format!("{channel}: {raw:?}")))?;

        Ok(milli as f64 / 1000.0)
    }
}

#[async_trait]
impl ClimateSensor for IioClimateSensor {
    async fn read(&mut self) -> Result<RawClimate, SensorError> {
        let temperature = self.read_channel(TEMPERATURE_CHANNEL).await;
        let humidity = self.read_channel(HUMIDITY_CHANNEL).await;

        match (temperature, humidity) {
            (Err(e), Err(_)) => Err(e),
            (temperature, humidity) => {
                if let Err(e) = &temperature {
                    tracing::debug!(error = %e, "temperature read dropped");
                }
                if let Err(e) = &humidity {
                    tracing::debug!(error = %e, "humidity read dropped");
                }

                Ok(RawClimate {
                    temperature_c: temperature.ok(),
                    humidity_percent: humidity.ok(),
                })
            }
        }
    }
}
