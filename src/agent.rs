//! Wires the configuration, the broker session and the two sensing tasks
//! together and runs them until shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, SensorBackend};
use crate::mq::{self, BrokerSession};
use crate::sensors::iio::IioClimateSensor;
use crate::sensors::sim::{SimulatedClimate, SimulatedVision};
use crate::sensors::stream::DetectionStream;
use crate::sensors::{ClimateSensor, VisionSensor};
use crate::supervisor::{RestartPolicy, Supervisor, TaskExit};
use crate::task::{ClimateTask, TaskSettings, VisionTask};

/// Connect to the broker, run both sensing tasks until `shutdown` is
/// cancelled, then disconnect.
///
/// Fails only when the broker session cannot be established; nothing that
/// happens inside a task is returned here.
pub async fn run(
    config: AgentConfig,
    shutdown: CancellationToken,
) -> Result<Vec<(&'static str, TaskExit)>, mq::Error> {
    tracing::info!(?config, "starting agent");

    let session = Arc::new(
        BrokerSession::new(&config.broker, &config.device_id)?.with_shutdown(shutdown.clone()),
    );
    session.connect().await?;

    let settings = TaskSettings {
        sample_interval: config.sample_interval,
        sample_timeout: config.sample_timeout,
    };
    let policy = RestartPolicy {
        max_restarts: config.max_task_restarts,
        ..RestartPolicy::default()
    };

    let mut supervisor = Supervisor::new(Arc::clone(&session), settings, policy, shutdown.clone());
    supervisor.spawn(vision_task(&config));
    supervisor.spawn(climate_task(&config));

    shutdown.cancelled().await;
    tracing::info!("shutting down");

    let exits = supervisor.join().await;
    for (task, exit) in &exits {
        tracing::info!(task, ?exit, "task finished");
    }

    if let Err(e) = session.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }

    Ok(exits)
}

pub fn vision_task(config: &AgentConfig) -> VisionTask {
    match &config.backend {
        SensorBackend::Hardware { vision_command, .. } => {
            let command = vision_command.clone();
            VisionTask::new(&config.room, move || {
                Ok(Box::new(DetectionStream::spawn(&command)?) as Box<dyn VisionSensor>)
            })
        }
        SensorBackend::Simulated => VisionTask::new(&config.room, || {
            Ok(Box::new(SimulatedVision::new()) as Box<dyn VisionSensor>)
        }),
    }
}

pub fn climate_task(config: &AgentConfig) -> ClimateTask {
    match &config.backend {
        SensorBackend::Hardware { climate_device, .. } => {
            let device = climate_device.clone();
            ClimateTask::new(&config.room, move || {
                Ok(Box::new(IioClimateSensor::open(device.clone())?) as Box<dyn ClimateSensor>)
            })
        }
        SensorBackend::Simulated => ClimateTask::new(&config.room, || {
            Ok(Box::new(SimulatedClimate::new()) as Box<dyn ClimateSensor>)
        }),
    }
}
