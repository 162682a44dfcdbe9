use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::orchestrator::{Orchestrator, OrchestratorError, RunTrigger};
use super::ports::{ContentFetcher, VerificationBackend, WorkSource};

/// Reject malformed schedule expressions without touching any running trigger.
pub fn validate_schedule(schedule: &str) -> Result<(), OrchestratorError> {
    Job::new_async(schedule, |_id, _scheduler| Box::pin(async {}))
        .map(|_| ())
        .map_err(|err| OrchestratorError::InvalidSchedule {
            schedule: schedule.to_string(),
            reason: format!("{err:?}"),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_since: Option<DateTime<Utc>>,
}

struct ActiveSchedule {
    scheduler: JobScheduler,
    schedule: String,
    since: DateTime<Utc>,
}

/// Fires batch runs on a cron schedule. Start and stop are idempotent.
pub struct ScheduleTrigger<S, F, B> {
    orchestrator: Arc<Orchestrator<S, F, B>>,
    state: Mutex<Option<ActiveSchedule>>,
}

impl<S, F, B> ScheduleTrigger<S, F, B>
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<S, F, B>>) -> Self {
        Self {
            orchestrator,
            state: Mutex::new(None),
        }
    }

    /// Start ticking under the configured schedule. Returns `false` if already active.
    pub async fn start(&self) -> Result<bool, OrchestratorError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(false);
        }

        let schedule = self.orchestrator.settings().schedule;
        *state = Some(self.launch(&schedule).await?);
        self.orchestrator.journal().info(
            "review scheduler started",
            Some(json!({ "schedule": schedule })),
        );
        Ok(true)
    }

    /// Stop ticking. Runs already in flight are not touched. Returns `false` if already idle.
    pub async fn stop(&self) -> Result<bool, OrchestratorError> {
        let mut state = self.state.lock().await;
        let Some(active) = state.take() else {
            return Ok(false);
        };

        Self::shutdown(active).await?;
        self.orchestrator
            .journal()
            .info("review scheduler stopped", None);
        Ok(true)
    }

    /// Swap an active trigger onto a new schedule; an idle trigger stays idle.
    ///
    /// If the new schedule cannot be launched the previous one is relaunched before the
    /// error is returned.
    pub async fn reschedule(&self, schedule: &str) -> Result<bool, OrchestratorError> {
        validate_schedule(schedule)?;

        let mut state = self.state.lock().await;
        let Some(previous) = state.take() else {
            return Ok(false);
        };

        let previous_schedule = previous.schedule.clone();
        Self::shutdown(previous).await?;
        match self.launch(schedule).await {
            Ok(active) => *state = Some(active),
            Err(err) => {
                match self.launch(&previous_schedule).await {
                    Ok(restored) => *state = Some(restored),
                    Err(restore_err) => self.orchestrator.journal().error(
                        "review scheduler could not be restored",
                        Some(json!({
                            "schedule": previous_schedule,
                            "error": restore_err.to_string(),
                        })),
                    ),
                }
                return Err(err);
            }
        }
        self.orchestrator.journal().info(
            "review scheduler restarted with new schedule",
            Some(json!({ "schedule": schedule })),
        );
        Ok(true)
    }

    pub async fn status(&self) -> TriggerStatus {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(active) => TriggerStatus {
                active: true,
                schedule: Some(active.schedule.clone()),
                active_since: Some(active.since),
            },
            None => TriggerStatus {
                active: false,
                schedule: None,
                active_since: None,
            },
        }
    }

    async fn launch(&self, schedule: &str) -> Result<ActiveSchedule, OrchestratorError> {
        validate_schedule(schedule)?;

        let orchestrator = Arc::clone(&self.orchestrator);
        let job = Job::new_async(schedule, move |_id, _scheduler| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                orchestrator.run_batch(RunTrigger::Scheduled).await;
            })
        })
        .map_err(|err| OrchestratorError::InvalidSchedule {
            schedule: schedule.to_string(),
            reason: format!("{err:?}"),
        })?;

        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        scheduler.add(job).await.map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;

        Ok(ActiveSchedule {
            scheduler,
            schedule: schedule.to_string(),
            since: Utc::now(),
        })
    }

    async fn shutdown(active: ActiveSchedule) -> Result<(), OrchestratorError> {
        let mut scheduler = active.scheduler;
        scheduler.shutdown().await.map_err(scheduler_error)
    }
}

fn scheduler_error(err: impl std::fmt::Debug) -> OrchestratorError {
    OrchestratorError::Scheduler(format!("{err:?}"))
}
