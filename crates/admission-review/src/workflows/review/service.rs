use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::domain::{SubjectRef, SubjectResult, SubjectResultSummary};
use super::journal::LogEntry;
use super::orchestrator::{
    Orchestrator, OrchestratorError, RunId, RunSummary, RunTrigger, RunView,
};
use super::ports::{ContentFetcher, VerificationBackend, WorkSource};
use super::settings::{SettingsUpdate, VerificationSettings};
use super::trigger::{validate_schedule, ScheduleTrigger, TriggerStatus};

/// Point-in-time view of the scheduler and the run state.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewStatus {
    pub scheduler: TriggerStatus,
    pub running: bool,
    pub stop_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_run: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
    pub cached_subjects: usize,
}

/// Facade composing the orchestrator and its schedule trigger for hosts and routes.
pub struct ReviewService<S, F, B> {
    orchestrator: Arc<Orchestrator<S, F, B>>,
    trigger: ScheduleTrigger<S, F, B>,
}

impl<S, F, B> ReviewService<S, F, B>
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<S, F, B>>) -> Self {
        let trigger = ScheduleTrigger::new(Arc::clone(&orchestrator));
        Self {
            orchestrator,
            trigger,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<S, F, B>> {
        &self.orchestrator
    }

    /// Bring the service up, starting the trigger when `auto_start` is configured.
    pub async fn init(&self) -> Result<(), OrchestratorError> {
        let settings = self.orchestrator.settings();
        settings.validate()?;
        validate_schedule(&settings.schedule)?;

        if settings.auto_start {
            self.trigger.start().await?;
        } else {
            self.orchestrator
                .journal()
                .info("review service ready; scheduler idle until started", None);
        }
        Ok(())
    }

    /// Stop the trigger and raise the stop flag on any active run.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.stop_scheduler().await.map(|_| ())
    }

    pub async fn start_scheduler(&self) -> Result<bool, OrchestratorError> {
        self.trigger.start().await
    }

    pub async fn stop_scheduler(&self) -> Result<bool, OrchestratorError> {
        let stopped = self.trigger.stop().await?;
        self.orchestrator.request_stop();
        Ok(stopped)
    }

    pub fn start_batch(&self) -> Result<RunId, OrchestratorError> {
        self.orchestrator.start_batch(RunTrigger::Manual)
    }

    pub async fn verify_subject(
        &self,
        subject: SubjectRef,
    ) -> Result<SubjectResult, OrchestratorError> {
        self.orchestrator.verify_subject(subject).await
    }

    pub async fn status(&self) -> ReviewStatus {
        ReviewStatus {
            scheduler: self.trigger.status().await,
            running: self.orchestrator.is_running(),
            stop_requested: self.orchestrator.stop_requested(),
            current_run: self.orchestrator.active_run().map(|run| run.summary()),
            last_run: self.orchestrator.last_run(),
            cached_subjects: self.orchestrator.cached_count(),
        }
    }

    pub fn run_detail(&self, run_id: &str) -> Result<RunView, OrchestratorError> {
        self.orchestrator.run_detail(run_id)
    }

    pub fn history(&self, limit: usize) -> Vec<RunSummary> {
        self.orchestrator.history(limit)
    }

    pub fn logs(&self, limit: usize) -> Vec<LogEntry> {
        self.orchestrator.journal().recent(limit)
    }

    pub fn settings(&self) -> VerificationSettings {
        self.orchestrator.settings()
    }

    /// Apply a whitelisted settings patch. A changed schedule restarts an active trigger.
    ///
    /// Settings are committed only once the trigger accepted the new schedule.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<VerificationSettings, OrchestratorError> {
        let current = self.orchestrator.settings();
        let next = current.merged(&update)?;
        if next.schedule != current.schedule {
            validate_schedule(&next.schedule)?;
            self.trigger.reschedule(&next.schedule).await?;
        }

        self.orchestrator.replace_settings(next.clone());
        self.orchestrator.journal().info(
            "review settings updated",
            Some(json!({ "settings": next })),
        );
        Ok(next)
    }

    pub fn cached_result(&self, subject_id: &str) -> Result<SubjectResult, OrchestratorError> {
        self.orchestrator.cached_result(subject_id)
    }

    pub fn cached_results(&self) -> Vec<SubjectResultSummary> {
        self.orchestrator.cached_results()
    }
}
