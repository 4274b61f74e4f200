//! Reading encoder: turns a [`Reading`] into the JSON payload sent on the wire.
//!
//! Numbers are rounded to the precision shared by every publisher in the
//! fleet: one decimal for temperature and humidity, four for confidence.
//! A value that is absent or not finite is left out of the payload. It is
//! never replaced by `0` or `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::reading::{ClimateReading, Reading, VisionReading};

pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_PRESENT: &str = "present";
pub const FIELD_COUNT: &str = "count";
pub const FIELD_CONFIDENCE: &str = "confidence";
pub const FIELD_TEMPERATURE: &str = "temperature";
pub const FIELD_HUMIDITY: &str = "humidity";

const CLIMATE_DECIMALS: i32 = 1;
const CONFIDENCE_DECIMALS: i32 = 4;

/// A flat JSON object, ready to publish.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message(Map<String, Value>);

impl Message {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialized JSON bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        // a map of strings to primitives always serializes
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    fn with_timestamp(captured_at: DateTime<Utc>) -> Message {
        let mut fields = Map::new();
        fields.insert(FIELD_TIMESTAMP.to_string(), Value::String(timestamp(captured_at)));
        Message(fields)
    }

    fn insert_bool(&mut self, field: &str, value: bool) {
        self.0.insert(field.to_string(), Value::Bool(value));
    }

    fn insert_u32(&mut self, field: &str, value: u32) {
        self.0.insert(field.to_string(), Value::from(value));
    }

    fn insert_rounded(&mut self, field: &str, value: Option<f64>, decimals: i32) {
        if let Some(number) = value
            .map(|v| round_to(v, decimals))
            .and_then(Number::from_f64)
        {
            self.0.insert(field.to_string(), Value::Number(number));
        }
    }
}

/// Which half of a climate reading a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateChannel {
    Temperature,
    Humidity,
}

pub fn encode(reading: &Reading) -> Message {
    match reading {
        Reading::Vision(r) => encode_vision(r),
        Reading::Climate(r) => encode_climate(r),
    }
}

pub fn encode_vision(reading: &VisionReading) -> Message {
    let mut message = Message::with_timestamp(reading.captured_at);
    message.insert_bool(FIELD_PRESENT, reading.present);
    message.insert_u32(FIELD_COUNT, reading.count);
    message.insert_rounded(FIELD_CONFIDENCE, Some(reading.confidence), CONFIDENCE_DECIMALS);
    message
}

pub fn encode_climate(reading: &ClimateReading) -> Message {
    let mut message = Message::with_timestamp(reading.captured_at);
    message.insert_rounded(FIELD_TEMPERATURE, reading.temperature_f, CLIMATE_DECIMALS);
    message.insert_rounded(FIELD_HUMIDITY, reading.humidity_percent, CLIMATE_DECIMALS);
    message
}

/// Split a climate reading into one message per value that is present.
///
/// Returns nothing when both halves of the read were dropped.
pub fn encode_channels(reading: &ClimateReading) -> Vec<(ClimateChannel, Message)> {
    let channels = [
        (ClimateChannel::Temperature, FIELD_TEMPERATURE, reading.temperature_f),
        (ClimateChannel::Humidity, FIELD_HUMIDITY, reading.humidity_percent),
    ];

    channels
        .into_iter()
        .filter_map(|(channel, field, value)| {
            let mut message = Message::with_timestamp(reading.captured_at);
            message.insert_rounded(field, value, CLIMATE_DECIMALS);
            message.contains(field).then_some((channel, message))
        })
        .collect()
}

/// RFC 3339 in UTC, millisecond precision, `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::reading::{Detection, RawClimate};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn timestamp_is_rfc3339_with_zone() {
        let message = encode_vision(&VisionReading::from_detections(&[], at()));
        let ts = message.get(FIELD_TIMESTAMP).and_then(Value::as_str).unwrap();

        assert_eq!(ts, "2026-03-14T09:26:53.000Z");
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), at());
    }

    #[test]
    fn empty_room_is_published_not_suppressed() {
        let message = encode(&VisionReading::from_detections(&[], at()).into());

        assert_eq!(message.get(FIELD_PRESENT), Some(&Value::Bool(false)));
        assert_eq!(message.get(FIELD_COUNT), Some(&Value::from(0)));
        assert_eq!(message.get(FIELD_CONFIDENCE).and_then(Value::as_f64), Some(0.0));
    }

    #[test]
    fn vision_confidence_keeps_four_decimals() {
        let detections = [Detection::person(0.123456), Detection::person(0.91)];
        let mut reading = VisionReading::from_detections(&detections, at());
        reading.confidence = 0.912345678;
        let message = encode_vision(&reading);

        assert_eq!(message.get(FIELD_CONFIDENCE).and_then(Value::as_f64), Some(0.9123));
        assert_eq!(message.get(FIELD_COUNT), Some(&Value::from(2)));
    }

    #[test]
    fn climate_values_keep_one_decimal() {
        let raw = RawClimate {
            temperature_c: Some(21.37),
            humidity_percent: Some(44.96),
        };
        let message = encode_climate(&ClimateReading::from_raw(raw, at()));

        assert_eq!(message.get(FIELD_TEMPERATURE).and_then(Value::as_f64), Some(70.5));
        assert_eq!(message.get(FIELD_HUMIDITY).and_then(Value::as_f64), Some(45.0));
    }

    #[test]
    fn twenty_celsius_is_sixty_eight_fahrenheit() {
        let raw = RawClimate {
            temperature_c: Some(20.0),
            humidity_percent: None,
        };
        let message = encode_climate(&ClimateReading::from_raw(raw, at()));

        assert_eq!(message.get(FIELD_TEMPERATURE).and_then(Value::as_f64), Some(68.0));
    }

    #[test]
    fn missing_humidity_is_omitted_not_zeroed() {
        let raw = RawClimate {
            temperature_c: Some(20.0),
            humidity_percent: None,
        };
        let message = encode(&ClimateReading::from_raw(raw, at()).into());

        assert!(message.contains(FIELD_TEMPERATURE));
        assert!(!message.contains(FIELD_HUMIDITY));
        assert_eq!(message.len(), 2);

        let payload: Value = serde_json::from_slice(&message.to_payload()).unwrap();
        assert!(payload.get(FIELD_HUMIDITY).is_none());
    }

    #[test]
    fn non_finite_values_never_reach_the_payload() {
        let reading = ClimateReading {
            temperature_f: Some(f64::NAN),
            humidity_percent: Some(f64::INFINITY),
            captured_at: at(),
        };
        let message = encode_climate(&reading);

        assert_eq!(message.fields().collect::<Vec<_>>(), vec![FIELD_TIMESTAMP]);
    }

    #[test]
    fn channels_split_per_present_value() {
        let both = ClimateReading::from_raw(
            RawClimate {
                temperature_c: Some(20.0),
                humidity_percent: Some(55.04),
            },
            at(),
        );
        let channels = encode_channels(&both);

        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].0, ClimateChannel::Temperature);
        assert_eq!(channels[0].1.get(FIELD_TEMPERATURE).and_then(Value::as_f64), Some(68.0));
        assert!(!channels[0].1.contains(FIELD_HUMIDITY));
        assert_eq!(channels[1].0, ClimateChannel::Humidity);
        assert_eq!(channels[1].1.get(FIELD_HUMIDITY).and_then(Value::as_f64), Some(55.0));

        let humidity_only = ClimateReading::from_raw(
            RawClimate {
                temperature_c: None,
                humidity_percent: Some(40.0),
            },
            at(),
        );
        let channels = encode_channels(&humidity_only);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].0, ClimateChannel::Humidity);

        let neither = ClimateReading::from_raw(RawClimate::default(), at());
        assert!(encode_channels(&neither).is_empty());
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(68.25, 1), 68.3);
        assert_eq!(round_to(-3.14159, 2), -3.14);
        assert_eq!(round_to(0.91, 4), 0.91);
    }
}
