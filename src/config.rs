//! Agent configuration, read once from the environment at startup.

use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sensors::iio;
use crate::topic::{InvalidRoom, Room};

pub const DEFAULT_MQTT_PORT: u16 = 8883;
pub const DEFAULT_ROOM: &str = "roomA";
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// How to reach and authenticate with the broker.
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// PEM bundle to trust instead of the system store.
    pub ca_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    pub reconnect_attempts: u32,
}

impl Debug for BrokerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("ca_file", &self.ca_file)
            .field("connect_timeout", &self.connect_timeout)
            .field("publish_timeout", &self.publish_timeout)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorBackend {
    /// External detector process and the DHT11 IIO device.
    Hardware {
        vision_command: Vec<String>,
        climate_device: PathBuf,
    },
    Simulated,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub broker: BrokerConfig,
    pub device_id: String,
    pub room: Room,
    pub sample_interval: Duration,
    pub sample_timeout: Duration,
    /// Consecutive restarts allowed per task. `None` keeps restarting.
    pub max_task_restarts: Option<u32>,
    pub backend: SensorBackend,
}

impl AgentConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<AgentConfig, Error> {
        AgentConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<AgentConfig, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let broker = BrokerConfig {
            host: vars.required("MQTT_HOST")?,
            port: vars.parsed("MQTT_PORT")?.unwrap_or(DEFAULT_MQTT_PORT),
            username: vars.required("MQTT_USER")?,
            password: vars.required("MQTT_PASS")?,
            ca_file: vars.optional("MQTT_CA_FILE").map(PathBuf::from),
            connect_timeout: vars
                .seconds("AGENT_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            publish_timeout: vars
                .seconds("AGENT_PUBLISH_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_PUBLISH_TIMEOUT),
            reconnect_attempts: vars
                .parsed("AGENT_RECONNECT_ATTEMPTS")?
                .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
        };

        let room = vars
            .optional("AGENT_ROOM")
            .unwrap_or_else(|| DEFAULT_ROOM.to_string());
        let room = Room::new(room)?;
        let device_id = vars
            .optional("AGENT_DEVICE_ID")
            .unwrap_or_else(|| format!("rpi-{room}"));

        let backend = match vars.optional("AGENT_SENSOR_BACKEND").as_deref() {
            None | Some("hardware") => {
                let command = vars.required("AGENT_VISION_COMMAND")?;
                SensorBackend::Hardware {
                    vision_command: command.split_whitespace().map(str::to_string).collect(),
                    climate_device: vars
                        .optional("AGENT_CLIMATE_DEVICE")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(iio::DEFAULT_DEVICE)),
                }
            }
            Some("simulated") => SensorBackend::Simulated,
            Some(other) => {
                return Err(Error::Invalid {
                    name: "AGENT_SENSOR_BACKEND",
                    value: other.to_string(),
                    reason: "expected `hardware` or `simulated`".to_string(),
                })
            }
        };

        Ok(AgentConfig {
            broker,
            device_id,
            room,
            sample_interval: vars
                .seconds("AGENT_SAMPLE_INTERVAL_SECS")?
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
            sample_timeout: vars
                .seconds("AGENT_SAMPLE_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_SAMPLE_TIMEOUT),
            max_task_restarts: vars.parsed("AGENT_MAX_TASK_RESTARTS")?,
            backend,
        })
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Unset and blank variables are treated the same.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, Error> {
        self.optional(name).ok_or(Error::Missing(name))
    }

    fn parsed<T>(&self, name: &'static str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(name)
            .map(|value| {
                value.parse().map_err(|e: T::Err| Error::Invalid {
                    name,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn seconds(&self, name: &'static str) -> Result<Option<Duration>, Error> {
        match self.parsed::<u64>(name)? {
            Some(0) => Err(Error::Invalid {
                name,
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            }),
            secs => Ok(secs.map(Duration::from_secs)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid room: {0}")]
    Room(#[from] InvalidRoom),
}
