//! Typed sensor observations, before wire encoding.
//!
//! A reading is built once from a raw sample, encoded, and dropped. Nothing
//! here keeps history between cycles.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The only object class the vision task reports on.
pub const PERSON_LABEL: &str = "person";

/// One object found by the detector in a frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(alias = "class", alias = "name")]
    pub label: String,
    #[serde(alias = "score", alias = "conf")]
    pub confidence: f64,
}

impl Detection {
    pub fn person(confidence: f64) -> Detection {
        Detection {
            label: PERSON_LABEL.to_string(),
            confidence,
        }
    }

    pub fn is_person(&self) -> bool {
        self.label.eq_ignore_ascii_case(PERSON_LABEL)
    }
}

/// Every detection of one processed camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub detections: Vec<Detection>,
    /// When the detector output for this frame reached the agent.
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(detections: Vec<Detection>, captured_at: DateTime<Utc>) -> Frame {
        Frame {
            detections,
            captured_at,
        }
    }

    /// A frame captured at the current instant.
    pub fn now(detections: Vec<Detection>) -> Frame {
        Frame::new(detections, Utc::now())
    }
}

/// Whether people are in view, and how sure the detector is.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionReading {
    pub present: bool,
    pub count: u32,
    /// Highest person confidence in the frame, `0.0` when nobody is seen.
    pub confidence: f64,
    pub captured_at: DateTime<Utc>,
}

impl VisionReading {
    /// Build a reading from every detection of one frame.
    ///
    /// Detections of other classes and detections with a non-finite score
    /// are ignored.
    pub fn from_detections(detections: &[Detection], captured_at: DateTime<Utc>) -> VisionReading {
        let mut count = 0u32;
        let mut confidence = 0.0f64;

        for detection in detections
            .iter()
            .filter(|d| d.is_person() && d.confidence.is_finite())
        {
            count = count.saturating_add(1);
            confidence = confidence.max(detection.confidence);
        }

        VisionReading {
            present: count > 0,
            count,
            confidence: confidence.clamp(0.0, 1.0),
            captured_at,
        }
    }

    pub fn from_frame(frame: &Frame) -> VisionReading {
        VisionReading::from_detections(&frame.detections, frame.captured_at)
    }
}

/// Raw output of a single climate sensor read.
///
/// Either value may be missing: the DHT protocol regularly drops one half
/// of a read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawClimate {
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClimateReading {
    pub temperature_f: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl ClimateReading {
    pub fn from_raw(raw: RawClimate, captured_at: DateTime<Utc>) -> ClimateReading {
        let temperature_f = raw
            .temperature_c
            .filter(|c| c.is_finite())
            .map(celsius_to_fahrenheit);
        let humidity_percent = raw
            .humidity_percent
            .filter(|h| h.is_finite() && (0.0..=100.0).contains(h));

        ClimateReading {
            temperature_f,
            humidity_percent,
            captured_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature_f.is_none() && self.humidity_percent.is_none()
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Vision(VisionReading),
    Climate(ClimateReading),
}

impl Reading {
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            Reading::Vision(r) => r.captured_at,
            Reading::Climate(r) => r.captured_at,
        }
    }
}

impl From<VisionReading> for Reading {
    fn from(reading: VisionReading) -> Self {
        Reading::Vision(reading)
    }
}

impl From<ClimateReading> for Reading {
    fn from(reading: ClimateReading) -> Self {
        Reading::Climate(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_detections_means_empty_room() {
        let reading = VisionReading::from_detections(&[], Utc::now());

        assert!(!reading.present);
        assert_eq!(reading.count, 0);
        assert_eq!(reading.confidence, 0.0);
    }

    #[test]
    fn confidence_is_the_highest_person_score() {
        let detections = [
            Detection::person(0.4),
            Detection::person(0.91),
            Detection::person(0.77),
        ];
        let reading = VisionReading::from_detections(&detections, Utc::now());

        assert!(reading.present);
        assert_eq!(reading.count, 3);
        assert_eq!(reading.confidence, 0.91);
    }

    #[test]
    fn other_classes_and_nan_scores_are_ignored() {
        let detections = [
            Detection {
                label: "dog".into(),
                confidence: 0.99,
            },
            Detection::person(f64::NAN),
            Detection {
                label: "Person".into(),
                confidence: 0.6,
            },
        ];
        let reading = VisionReading::from_detections(&detections, Utc::now());

        assert_eq!(reading.count, 1);
        assert_eq!(reading.confidence, 0.6);
    }

    #[test]
    fn converts_celsius() {
        assert_eq!(celsius_to_fahrenheit(20.0), 68.0);
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    }

    #[test]
    fn out_of_range_humidity_is_absent() {
        let raw = RawClimate {
            temperature_c: Some(21.0),
            humidity_percent: Some(140.0),
        };
        let reading = ClimateReading::from_raw(raw, Utc::now());

        assert!(reading.temperature_f.is_some());
        assert_eq!(reading.humidity_percent, None);
        assert!(!reading.is_empty());
    }

    #[test]
    fn both_halves_missing_is_empty() {
        let reading = ClimateReading::from_raw(RawClimate::default(), Utc::now());

        assert!(reading.is_empty());
    }
}
