//! # Room Sensor Agent
//!
//! Room Sensor Agent runs on a Raspberry Pi in a room. It watches the
//! camera for people and reads a DHT11 temperature/humidity probe, and
//! publishes both as JSON messages to an MQTT broker over TLS:
//!
//! | topic                  | payload                                             |
//! |------------------------|-----------------------------------------------------|
//! | `<room>/person/status` | `{"present", "count", "confidence", "timestamp"}`   |
//! | `<room>/temperature`   | `{"temperature", "timestamp"}` (°F)                 |
//! | `<room>/humidity`      | `{"humidity", "timestamp"}` (%)                     |
//!
//! Each sensor runs in its own [`task`] loop under the [`supervisor`];
//! both share one [`mq::BrokerSession`].

pub mod agent;
pub mod backoff;
pub mod config;
pub mod encoder;
pub mod mq;
pub mod reading;
pub mod sensors;
pub mod supervisor;
pub mod task;
pub mod telemetry;
pub mod topic;
