//! Supervisor: runs every sensing task on its own tokio task and keeps a
//! failure in one from reaching the others.
//!
//! Each run of a task loop is spawned separately, so a panic inside a
//! sensor driver surfaces as a [`tokio::task::JoinError`] instead of
//! unwinding through the supervisor. A task that exits for any reason other
//! than shutdown is restarted after a jittered, exponentially growing delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::mq::Publisher;
use crate::task::{run as run_task, CycleStats, SensingTask, TaskSettings};

/// When and how often a dead task is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Consecutive failed runs tolerated before giving up. `None` never
    /// gives up.
    pub max_restarts: Option<u32>,
    pub backoff: Backoff,
    /// A run that lasted this long resets the consecutive failure count.
    pub stable_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy {
            max_restarts: None,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(300)),
            stable_after: Duration::from_secs(60),
        }
    }
}

/// How a supervised task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// Stopped because of shutdown. Carries the counters of the last run.
    Shutdown(CycleStats),
    /// Restart limit reached; the task stays down.
    GaveUp { restarts: u32 },
}

pub struct Supervisor<P> {
    publisher: Arc<P>,
    settings: TaskSettings,
    policy: RestartPolicy,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<TaskExit>)>,
}

impl<P: Publisher + 'static> Supervisor<P> {
    pub fn new(
        publisher: Arc<P>,
        settings: TaskSettings,
        policy: RestartPolicy,
        shutdown: CancellationToken,
    ) -> Supervisor<P> {
        Supervisor {
            publisher,
            settings,
            policy,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start supervising `task`. Returns immediately.
    pub fn spawn<T: SensingTask>(&mut self, task: T) {
        let name = task.name();
        let handle = tokio::spawn(supervise(
            Arc::new(task),
            Arc::clone(&self.publisher),
            self.settings,
            self.policy,
            self.shutdown.clone(),
        ));

        tracing::info!(task = name, "task started");
        self.tasks.push((name, handle));
    }

    /// Wait for every task to end. Tasks only end after shutdown or after
    /// giving up, so this blocks for the life of the agent.
    pub async fn join(self) -> Vec<(&'static str, TaskExit)> {
        let mut exits = Vec::with_capacity(self.tasks.len());

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(exit) => exits.push((name, exit)),
                Err(e) => tracing::error!(task = name, error = %e, "supervisor for task failed"),
            }
        }

        exits
    }
}

async fn supervise<T, P>(
    task: Arc<T>,
    publisher: Arc<P>,
    settings: TaskSettings,
    policy: RestartPolicy,
    shutdown: CancellationToken,
) -> TaskExit
where
    T: SensingTask,
    P: Publisher + 'static,
{
    let name = task.name();
    let mut failures: u32 = 0;

    loop {
        let started = Instant::now();
        let run = tokio::spawn({
            let task = Arc::clone(&task);
            let publisher = Arc::clone(&publisher);
            let shutdown = shutdown.clone();
            async move { run_task(task.as_ref(), publisher.as_ref(), &settings, &shutdown).await }
        });

        let reason = match run.await {
            Ok(Ok(stats)) => return TaskExit::Shutdown(stats),
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => format!("panicked: {e}"),
            Err(e) => e.to_string(),
        };

        if shutdown.is_cancelled() {
            return TaskExit::Shutdown(CycleStats::default());
        }

        if started.elapsed() >= policy.stable_after {
            failures = 0;
        }
        if policy.max_restarts.is_some_and(|max| failures >= max) {
            tracing::error!(
                task = name,
                restarts = failures,
                %reason,
                "task keeps failing, giving up"
            );
            return TaskExit::GaveUp { restarts: failures };
        }

        let delay = policy.backoff.delay(failures);
        failures += 1;
        tracing::warn!(
            task = name,
            %reason,
            restart = failures,
            delay_ms = delay.as_millis() as u64,
            "task exited unexpectedly, restarting"
        );

        tokio::select! {
            _ = shutdown.cancelled() => return TaskExit::Shutdown(CycleStats::default()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
