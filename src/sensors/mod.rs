//! Sensor collaborators.
//!
//! The agent treats the camera pipeline and the climate probe as black
//! boxes behind [`VisionSensor`] and [`ClimateSensor`]. Backends:
//!
//! - [`stream::DetectionStream`]: an external camera + detector process that
//!   prints one line of detections per frame.
//! - [`iio::IioClimateSensor`]: the Linux DHT11 IIO driver.
//! - [`sim`]: simulated sensors for running without hardware.

use std::time::Duration;

use async_trait::async_trait;

use crate::reading::{Frame, RawClimate};

pub mod iio;
pub mod sim;
pub mod stream;

/// One frame plus one inference pass.
#[async_trait]
pub trait VisionSensor: Send {
    async fn detect(&mut self) -> Result<Frame, SensorError>;
}

/// One hardware read of the temperature/humidity probe.
#[async_trait]
pub trait ClimateSensor: Send {
    async fn read(&mut self) -> Result<RawClimate, SensorError>;
}

#[async_trait]
impl<S: VisionSensor + ?Sized> VisionSensor for Box<S> {
    async fn detect(&mut self) -> Result<Frame, SensorError> {
        (**self).detect().await
    }
}

#[async_trait]
impl<S: ClimateSensor + ?Sized> ClimateSensor for Box<S> {
    async fn read(&mut self) -> Result<RawClimate, SensorError> {
        (**self).read().await
    }
}

/// Acquires a sensor handle. Called once per task run.
pub type Opener<S> = Box<dyn Fn() -> Result<S, SensorError> + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    #[error("malformed sensor output: {0}")]
    Malformed(String),

    #[error("sample timed out after {0:?}")]
    Timeout(Duration),

    #[error("frame stream ended")]
    StreamEnded,
}

impl SensorError {
    /// The sensor cannot produce another sample without being reopened.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SensorError::StreamEnded)
    }
}
