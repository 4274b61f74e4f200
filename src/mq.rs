//! Message queue: the one broker session every sensing task publishes through.

use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::global::get_text_map_propagator;
use paho_mqtt::async_client::AsyncClient as MqttClient;
use paho_mqtt::{
    ConnectOptions, ConnectOptionsBuilder, CreateOptionsBuilder,
    MessageBuilder as MqttMessageBuilder, Properties as MqttProps, Property, PropertyCode,
    SslOptionsBuilder,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::backoff::Backoff;
use crate::config::BrokerConfig;
use crate::encoder::Message;
use crate::topic::Topic;

/// At-least-once: the broker acknowledges every publish.
const QOS_AT_LEAST_ONCE: i32 = 1;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF: Backoff =
    Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

/// Anything a sensing task can hand its messages to.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns once the broker accepted the message for delivery.
    async fn publish(&self, topic: &Topic, message: &Message) -> Result<(), Error>;
}

/// An authenticated TLS session with the broker.
///
/// Created once per process and shared by reference. Tasks can publish
/// through it but cannot close or reconfigure it.
pub struct BrokerSession {
    client: MqttClient,
    connect_options: ConnectOptions,
    device_id: String,
    connect_timeout: Duration,
    publish_timeout: Duration,
    reconnect_attempts: u32,
    reconnecting: Mutex<()>,
    shutdown: CancellationToken,
}

impl BrokerSession {
    pub fn new<T: AsRef<str>>(config: &BrokerConfig, device_id: T) -> Result<BrokerSession, Error> {
        let server_uri = format!("ssl://{}:{}", config.host, config.port);
        let client = MqttClient::new(
            CreateOptionsBuilder::new()
                .server_uri(server_uri)
                .client_id(device_id.as_ref())
                .mqtt_version(paho_mqtt::MQTT_VERSION_5)
                .finalize(),
        )?;

        let mut ssl_options = SslOptionsBuilder::new();
        ssl_options.enable_server_cert_auth(true).verify(true);
        if let Some(ca_file) = &config.ca_file {
            if !ca_file.is_file() {
                return Err(Error::TrustStore(ca_file.clone()));
            }
            ssl_options.trust_store(ca_file)?;
        }

        let connect_options = ConnectOptionsBuilder::new_v5()
            .keep_alive_interval(KEEP_ALIVE)
            .clean_start(true)
            .user_name(config.username.as_str())
            .password(config.password.clone())
            .ssl_options(ssl_options.finalize())
            .connect_timeout(config.connect_timeout)
            .finalize();

        Ok(BrokerSession {
            client,
            connect_options,
            device_id: device_id.as_ref().to_string(),
            connect_timeout: config.connect_timeout,
            publish_timeout: config.publish_timeout,
            reconnect_attempts: config.reconnect_attempts,
            reconnecting: Mutex::new(()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Abandon reconnection once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> BrokerSession {
        self.shutdown = shutdown;
        self
    }

    /// Connect to the MQTT broker.
    ///
    /// You must call this method before publishing. Gives up with
    /// [`Error::ConnectTimeout`] when the broker does not answer in time.
    #[tracing::instrument(err)]
    pub async fn connect(&self) -> Result<(), Error> {
        tracing::info!("connect to the MQTT broker");

        let response = tokio::time::timeout(
            self.connect_timeout,
            self.client.connect(self.connect_options.clone()),
        )
        .await
        .map_err(|_| Error::ConnectTimeout(self.connect_timeout))?;

        match response {
            Ok(info) => {
                tracing::info!(?info, "connected to the MQTT broker");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to connect to the MQTT broker");
                Err(e.into())
            }
        }
    }

    /// Disconnect cleanly. Only called at shutdown.
    #[tracing::instrument(err)]
    pub async fn disconnect(&self) -> Result<(), Error> {
        if !self.client.is_connected() {
            tracing::info!("already disconnected from the MQTT broker");
            return Ok(());
        }

        self.client.disconnect(None).await?;
        tracing::info!("disconnected from the MQTT broker");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Publish the message to the specified topic.
    #[tracing::instrument(skip(message), err)]
    pub async fn send(&self, topic: &Topic, message: &Message) -> Result<(), Error> {
        self.ensure_connected().await?;

        let mqtt_message = self.build_message(topic, message)?;

        tracing::debug!(?mqtt_message, "publishing the message to the MQTT broker");
        tokio::time::timeout(self.publish_timeout, self.client.publish(mqtt_message))
            .await
            .map_err(|_| Error::PublishTimeout(self.publish_timeout))??;

        tracing::debug!("message accepted by the broker");
        Ok(())
    }

    /// Package the payload with its MQTT v5 properties.
    fn build_message(&self, topic: &Topic, message: &Message) -> Result<paho_mqtt::Message, Error> {
        let message_id = uuid::Uuid::now_v7().to_string();
        let emitted_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        tracing::debug!(message_id, emitted_at, "putting properties");

        let content_type = Property::new_string(PropertyCode::ContentType, "application/json")?;
        let mut message_properties = MqttProps::new();
        message_properties.push(content_type)?;
        for (key, value) in [
            ("message_id", message_id.as_str()),
            ("device_id", self.device_id.as_str()),
            ("emitted_at", emitted_at.as_str()),
        ] {
            message_properties.push_string_pair(PropertyCode::UserProperty, key, value)?;
        }

        // tracing information
        let ctx = tracing::Span::current().context();
        get_text_map_propagator(|propagator| {
            propagator.inject_context(&ctx, &mut MqttCarrierInjector(&mut message_properties))
        });

        Ok(MqttMessageBuilder::new()
            .topic(topic.as_str())
            .payload(message.to_payload())
            .qos(QOS_AT_LEAST_ONCE)
            .retained(false)
            .properties(message_properties)
            .finalize())
    }

    /// Reconnect when the connection was lost since the last publish.
    ///
    /// Only one task reconnects at a time; the others wait and then find
    /// the session connected again. Gives up early with
    /// [`Error::ShuttingDown`] once shutdown starts.
    async fn ensure_connected(&self) -> Result<(), Error> {
        if self.client.is_connected() {
            return Ok(());
        }

        let _guard = self.reconnecting.lock().await;
        if self.client.is_connected() {
            return Ok(());
        }

        for attempt in 0..self.reconnect_attempts {
            let delay = RECONNECT_BACKOFF.delay(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "broker connection lost, reconnecting"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::ShuttingDown),
                _ = tokio::time::sleep(delay) => {}
            }

            let reconnect = tokio::time::timeout(self.connect_timeout, self.client.reconnect());
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::ShuttingDown),
                result = reconnect => result,
            };

            match result {
                Ok(Ok(_)) => {
                    tracing::info!("reconnected to the MQTT broker");
                    return Ok(());
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "reconnect failed"),
                Err(_) => tracing::warn!(timeout = ?self.connect_timeout, "reconnect timed out"),
            }
        }

        Err(Error::Reconnect(self.reconnect_attempts))
    }
}

#[async_trait]
impl Publisher for BrokerSession {
    async fn publish(&self, topic: &Topic, message: &Message) -> Result<(), Error> {
        self.send(topic, message).await
    }
}

impl Debug for BrokerSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSession")
            .field("server_uri", &self.client.server_uri())
            .field("device_id", &self.device_id)
            .finish()
    }
}

pub struct MqttCarrierInjector<'a>(pub &'a mut MqttProps);

impl<'a> opentelemetry::propagation::Injector for MqttCarrierInjector<'a> {
    fn set(&mut self, key: &str, value: String) {
        if let Err(e) = self.0.push_string_pair(PropertyCode::UserProperty, key, &value) {
            tracing::warn!(error = %e, key, "cannot attach trace context to the message");
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("mqtt: {0}")]
    Mqtt(#[from] paho_mqtt::Error),

    #[error("trust store {0:?} is not a readable file")]
    TrustStore(PathBuf),

    #[error("broker did not answer within {0:?}")]
    ConnectTimeout(Duration),

    #[error("broker did not acknowledge the message within {0:?}")]
    PublishTimeout(Duration),

    #[error("still disconnected after {0} reconnect attempts")]
    Reconnect(u32),

    #[error("reconnection abandoned, shutting down")]
    ShuttingDown,
}
