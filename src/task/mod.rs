//! Sensing tasks: sample → encode → publish → sleep, forever.
//!
//! A task is split into [`SensingTask::init`], which acquires the sensor
//! handle, and [`SensingTask::sample`], which turns one raw sample into
//! outgoing messages. [`run`] drives the loop and is the recovery boundary
//! for everything that can go wrong inside a cycle.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_SAMPLE_INTERVAL, DEFAULT_SAMPLE_TIMEOUT};
use crate::encoder::Message;
use crate::mq::Publisher;
use crate::sensors::SensorError;
use crate::topic::Topic;

mod climate;
mod vision;

pub use climate::ClimateTask;
pub use vision::VisionTask;

/// A message bound for a fixed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub topic: Topic,
    pub message: Message,
}

#[async_trait]
pub trait SensingTask: Send + Sync + 'static {
    /// The sensor handle, owned by one run of the loop.
    type Sensor: Send;

    fn name(&self) -> &'static str;

    /// Acquire and configure the sensor. A failure ends this run.
    fn init(&self) -> Result<Self::Sensor, SensorError>;

    /// Take one sample and encode it. An empty list means there is nothing
    /// to publish this cycle.
    async fn sample(&self, sensor: &mut Self::Sensor) -> Result<Vec<Outgoing>, SensorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    /// Pause between the end of one cycle and the next sample.
    pub sample_interval: Duration,
    /// Longest a single sample may take before the cycle is skipped.
    pub sample_timeout: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        TaskSettings {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
        }
    }
}

/// Counters for one run of a task loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub published: u64,
    pub sample_failures: u64,
    pub publish_failures: u64,
}

/// Run `task` until `shutdown` is cancelled.
///
/// Returns `Err` only when the sensor cannot be acquired or can no longer
/// produce samples. Sample and publish failures are logged and the loop
/// moves on to the next cycle.
pub async fn run<T, P>(
    task: &T,
    publisher: &P,
    settings: &TaskSettings,
    shutdown: &CancellationToken,
) -> Result<CycleStats, SensorError>
where
    T: SensingTask + ?Sized,
    P: Publisher + ?Sized,
{
    let name = task.name();
    let mut sensor = task.init().map_err(|e| {
        tracing::error!(task = name, error = %e, "cannot acquire sensor");
        e
    })?;
    tracing::info!(task = name, "sensor acquired, sampling");

    let mut stats = CycleStats::default();
    while !shutdown.is_cancelled() {
        stats.cycles += 1;

        match tokio::time::timeout(settings.sample_timeout, task.sample(&mut sensor)).await {
            Ok(Ok(outgoing)) => {
                if outgoing.is_empty() {
                    tracing::debug!(task = name, "nothing to publish this cycle");
                }
                for Outgoing { topic, message } in outgoing {
                    match publisher.publish(&topic, &message).await {
                        Ok(()) => stats.published += 1,
                        Err(e) => {
                            stats.publish_failures += 1;
                            tracing::warn!(
                                task = name,
                                %topic,
                                error = %e,
                                "publish failed, dropping message"
                            );
                        }
                    }
                }
            }
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!(
                    task = name,
                    error = %e,
                    ?stats,
                    "sensor stopped producing samples"
                );
                return Err(e);
            }
            Ok(Err(e)) => {
                stats.sample_failures += 1;
                tracing::warn!(task = name, error = %e, "sample failed, skipping cycle");
            }
            Err(_) => {
                stats.sample_failures += 1;
                let e = SensorError::Timeout(settings.sample_timeout);
                tracing::warn!(task = name, error = %e, "sample failed, skipping cycle");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(settings.sample_interval) => {}
        }
    }

    tracing::info!(task = name, ?stats, "task stopped");
    Ok(stats)
}
