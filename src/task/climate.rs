use async_trait::async_trait;
use chrono::Utc;

use super::{Outgoing, SensingTask};
use crate::encoder::{self, ClimateChannel};
use crate::reading::ClimateReading;
use crate::sensors::{ClimateSensor, Opener, SensorError};
use crate::topic::{Room, Topic};

/// Publishes temperature (°F) on `<room>/temperature` and relative humidity
/// on `<room>/humidity`, each only when that half of the read succeeded.
pub struct ClimateTask {
    temperature_topic: Topic,
    humidity_topic: Topic,
    open: Opener<Box<dyn ClimateSensor>>,
}

impl ClimateTask {
    pub fn new<F>(room: &Room, open: F) -> ClimateTask
    where
        F: Fn() -> Result<Box<dyn ClimateSensor>, SensorError> + Send + Sync + 'static,
    {
        ClimateTask {
            temperature_topic: Topic::temperature(room),
            humidity_topic: Topic::humidity(room),
            open: Box::new(open),
        }
    }

    pub fn topic(&self, channel: ClimateChannel) -> &Topic {
        match channel {
            ClimateChannel::Temperature => &self.temperature_topic,
            ClimateChannel::Humidity => &self.humidity_topic,
        }
    }
}

#[async_trait]
impl SensingTask for ClimateTask {
    type Sensor = Box<dyn ClimateSensor>;

    fn name(&self) -> &'static str {
        "climate"
    }

    fn init(&self) -> Result<Self::Sensor, SensorError> {
        (self.open)()
    }

    async fn sample(&self, sensor: &mut Self::Sensor) -> Result<Vec<Outgoing>, SensorError> {
        let raw = sensor.read().await?;
        let reading = ClimateReading::from_raw(raw, Utc::now());

        if reading.is_empty() {
            tracing::debug!(?raw, "no usable climate value this cycle");
            return Ok(Vec::new());
        }
        tracing::debug!(
            temperature_f = reading.temperature_f,
            humidity = reading.humidity_percent,
            "climate read"
        );

        Ok(encoder::encode_channels(&reading)
            .into_iter()
            .map(|(channel, message)| Outgoing {
                topic: self.topic(channel).clone(),
                message,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::reading::RawClimate;

    struct Fixed(RawClimate);

    #[async_trait]
    impl ClimateSensor for Fixed {
        async fn read(&mut self) -> Result<RawClimate, SensorError> {
            Ok(self.0)
        }
    }

    async fn sample(raw: RawClimate) -> Vec<Outgoing> {
        let room = Room::new("roomA").unwrap();
        let task = ClimateTask::new(&room, move || {
            Ok(Box::new(Fixed(raw)) as Box<dyn ClimateSensor>)
        });
        let mut sensor = task.init().unwrap();

        task.sample(&mut sensor).await.unwrap()
    }

    #[tokio::test]
    async fn publishes_fahrenheit_and_humidity_on_their_topics() {
        let outgoing = sample(RawClimate {
            temperature_c: Some(20.0),
            humidity_percent: Some(38.26),
        })
        .await;

        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].topic.as_str(), "roomA/temperature");
        assert_eq!(outgoing[0].message.get("temperature").and_then(Value::as_f64), Some(68.0));
        assert_eq!(outgoing[1].topic.as_str(), "roomA/humidity");
        assert_eq!(outgoing[1].message.get("humidity").and_then(Value::as_f64), Some(38.3));
    }

    #[tokio::test]
    async fn missing_humidity_publishes_temperature_only() {
        let outgoing = sample(RawClimate {
            temperature_c: Some(20.0),
            humidity_percent: None,
        })
        .await;

        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].topic.as_str(), "roomA/temperature");
        assert!(!outgoing[0].message.contains("humidity"));
    }

    #[tokio::test]
    async fn nothing_usable_publishes_nothing() {
        let outgoing = sample(RawClimate {
            temperature_c: Some(f64::NAN),
            humidity_percent: None,
        })
        .await;

        assert!(outgoing.is_empty());
    }
}
