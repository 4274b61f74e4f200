use async_trait::async_trait;

use super::{Outgoing, SensingTask};
use crate::encoder;
use crate::reading::VisionReading;
use crate::sensors::{Opener, SensorError, VisionSensor};
use crate::topic::{Room, Topic};

/// Publishes person presence on `<room>/person/status` every cycle,
/// including when the room is empty.
pub struct VisionTask {
    topic: Topic,
    open: Opener<Box<dyn VisionSensor>>,
}

impl VisionTask {
    pub fn new<F>(room: &Room, open: F) -> VisionTask
    where
        F: Fn() -> Result<Box<dyn VisionSensor>, SensorError> + Send + Sync + 'static,
    {
        VisionTask {
            topic: Topic::person_status(room),
            open: Box::new(open),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

#[async_trait]
impl SensingTask for VisionTask {
    type Sensor = Box<dyn VisionSensor>;

    fn name(&self) -> &'static str {
        "vision"
    }

    fn init(&self) -> Result<Self::Sensor, SensorError> {
        (self.open)()
    }

    async fn sample(&self, sensor: &mut Self::Sensor) -> Result<Vec<Outgoing>, SensorError> {
        let frame = sensor.detect().await?;
        let reading = VisionReading::from_frame(&frame);

        tracing::debug!(
            count = reading.count,
            confidence = reading.confidence,
            "people detected"
        );

        Ok(vec![Outgoing {
            topic: self.topic.clone(),
            message: encoder::encode(&reading.into()),
        }])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::reading::{Detection, Frame};

    struct Fixed(Frame);

    #[async_trait]
    impl VisionSensor for Fixed {
        async fn detect(&mut self) -> Result<Frame, SensorError> {
            Ok(self.0.clone())
        }
    }

    fn task_replaying(frame: Frame) -> VisionTask {
        let room = Room::new("roomA").unwrap();
        VisionTask::new(&room, move || {
            Ok(Box::new(Fixed(frame.clone())) as Box<dyn VisionSensor>)
        })
    }

    fn task_seeing(detections: Vec<Detection>) -> VisionTask {
        task_replaying(Frame::now(detections))
    }

    #[tokio::test]
    async fn empty_room_is_still_published() {
        let task = task_seeing(vec![]);
        let mut sensor = task.init().unwrap();

        let outgoing = task.sample(&mut sensor).await.unwrap();

        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].topic.as_str(), "roomA/person/status");
        let message = &outgoing[0].message;
        assert_eq!(message.get("present"), Some(&Value::Bool(false)));
        assert_eq!(message.get("confidence").and_then(Value::as_f64), Some(0.0));
    }

    #[tokio::test]
    async fn reports_highest_confidence_and_count() {
        let task = task_seeing(vec![
            Detection::person(0.4),
            Detection::person(0.91),
            Detection::person(0.77),
        ]);
        let mut sensor = task.init().unwrap();

        let outgoing = task.sample(&mut sensor).await.unwrap();
        let message = &outgoing[0].message;

        assert_eq!(message.get("present"), Some(&Value::Bool(true)));
        assert_eq!(message.get("count"), Some(&Value::from(3)));
        assert_eq!(message.get("confidence").and_then(Value::as_f64), Some(0.91));
    }

    #[tokio::test]
    async fn timestamp_is_when_the_frame_arrived() {
        let arrived = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let task = task_replaying(Frame::new(vec![Detection::person(0.6)], arrived));
        let mut sensor = task.init().unwrap();

        let outgoing = task.sample(&mut sensor).await.unwrap();

        assert_eq!(
            outgoing[0].message.get("timestamp").and_then(Value::as_str),
            Some("2026-03-14T09:26:53.000Z")
        );
    }
}
