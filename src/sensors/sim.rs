//! Simulated sensors, for running the agent on a machine without a camera
//! or a DHT probe.
//!
//! The climate simulation drifts slowly around a room temperature and drops
//! reads like a real DHT11. The vision simulation has someone walk in or
//! out of the room with a 20% chance per sample.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ClimateSensor, SensorError, VisionSensor};
use crate::reading::{Detection, Frame, RawClimate};

const START_TEMPERATURE_C: f64 = 21.1;
const TEMPERATURE_RANGE_C: (f64, f64) = (15.0, 29.0);
const TEMPERATURE_STEP_C: f64 = 0.3;

const START_HUMIDITY: f64 = 45.0;
const HUMIDITY_RANGE: (f64, f64) = (20.0, 80.0);
const HUMIDITY_STEP: f64 = 1.0;

const DEFAULT_DROP_RATE: f64 = 0.1;
const TOGGLE_PROBABILITY: f64 = 0.2;

#[derive(Debug)]
pub struct SimulatedClimate {
    rng: StdRng,
    temperature_c: f64,
    humidity_percent: f64,
    drop_rate: f64,
}

impl SimulatedClimate {
    pub fn new() -> SimulatedClimate {
        SimulatedClimate::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> SimulatedClimate {
        SimulatedClimate::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> SimulatedClimate {
        SimulatedClimate {
            rng,
            temperature_c: START_TEMPERATURE_C,
            humidity_percent: START_HUMIDITY,
            drop_rate: DEFAULT_DROP_RATE,
        }
    }

    /// Probability that each half of a read is dropped. NaN means never.
    pub fn drop_rate(mut self, drop_rate: f64) -> SimulatedClimate {
        self.drop_rate = if drop_rate.is_nan() {
            0.0
        } else {
            drop_rate.clamp(0.0, 1.0)
        };
        self
    }
}

impl Default for SimulatedClimate {
    fn default() -> Self {
        SimulatedClimate::new()
    }
}

#[async_trait]
impl ClimateSensor for SimulatedClimate {
    async fn read(&mut self) -> Result<RawClimate, SensorError> {
        self.temperature_c = (self.temperature_c
            + self.rng.gen_range(-TEMPERATURE_STEP_C..=TEMPERATURE_STEP_C))
        .clamp(TEMPERATURE_RANGE_C.0, TEMPERATURE_RANGE_C.1);
        self.humidity_percent = (self.humidity_percent
            + self.rng.gen_range(-HUMIDITY_STEP..=HUMIDITY_STEP))
        .clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);

        let temperature_c = (!self.rng.gen_bool(self.drop_rate)).then_some(self.temperature_c);
        let humidity_percent =
            (!self.rng.gen_bool(self.drop_rate)).then_some(self.humidity_percent);

        if temperature_c.is_none() && humidity_percent.is_none() {
            return Err(SensorError::Malformed("simulated checksum mismatch".to_string()));
        }

        Ok(RawClimate {
            temperature_c,
            humidity_percent,
        })
    }
}

#[derive(Debug)]
pub struct SimulatedVision {
    rng: StdRng,
    present: bool,
}

impl SimulatedVision {
    pub fn new() -> SimulatedVision {
        SimulatedVision {
            rng: StdRng::from_entropy(),
            present: false,
        }
    }

    pub fn with_seed(seed: u64) -> SimulatedVision {
        SimulatedVision {
            rng: StdRng::seed_from_u64(seed),
            present: false,
        }
    }
}

impl Default for SimulatedVision {
    fn default() -> Self {
        SimulatedVision::new()
    }
}

#[async_trait]
impl VisionSensor for SimulatedVision {
    async fn detect(&mut self) -> Result<Frame, SensorError> {
        if self.rng.gen_bool(TOGGLE_PROBABILITY) {
            self.present = !self.present;
        }
        if !self.present {
            return Ok(Frame::now(Vec::new()));
        }

        let people = self.rng.gen_range(1..=2);
        Ok(Frame::now(
            (0..people)
                .map(|_| Detection::person(self.rng.gen_range(0.65..0.95)))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn climate_stays_in_range() {
        let mut sensor = SimulatedClimate::with_seed(7).drop_rate(0.0);

        for _ in 0..500 {
            let raw = sensor.read().await.unwrap();
            let t = raw.temperature_c.unwrap();
            let h = raw.humidity_percent.unwrap();
            assert!((TEMPERATURE_RANGE_C.0..=TEMPERATURE_RANGE_C.1).contains(&t));
            assert!((HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&h));
        }
    }

    #[tokio::test]
    async fn full_drop_rate_fails_every_read() {
        let mut sensor = SimulatedClimate::with_seed(7).drop_rate(1.0);

        assert!(sensor.read().await.is_err());
    }

    #[tokio::test]
    async fn nonsense_drop_rates_are_clamped() {
        let mut sensor = SimulatedClimate::with_seed(7).drop_rate(f64::NAN);
        assert!(sensor.read().await.is_ok());

        let mut sensor = SimulatedClimate::with_seed(7).drop_rate(f64::NEG_INFINITY);
        assert!(sensor.read().await.is_ok());

        let mut sensor = SimulatedClimate::with_seed(7).drop_rate(f64::INFINITY);
        assert!(sensor.read().await.is_err());
    }

    #[tokio::test]
    async fn vision_confidences_look_like_a_detector() {
        let mut sensor = SimulatedVision::with_seed(11);
        let mut seen_someone = false;

        for _ in 0..200 {
            let detections = sensor.detect().await.unwrap().detections;
            assert!(detections.len() <= 2);
            for d in &detections {
                seen_someone = true;
                assert!(d.is_person());
                assert!((0.65..0.95).contains(&d.confidence));
            }
        }

        assert!(seen_someone);
    }
}
