use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::cache::ResultCache;
use super::domain::{SubjectResult, SubjectResultSummary, SubjectRef, SubjectStatus};
use super::journal::{Journal, RunHistory, DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_CAPACITY};
use super::ports::{ContentFetcher, VerificationBackend, WorkSource};
use super::processor::SubjectProcessor;
use super::settings::{SettingsError, VerificationSettings};

/// Identifier of one batch run, derived from its start time and a per-orchestrator sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Error,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

/// Aggregate counters across every subject a run touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub subjects: u32,
    pub processed: u32,
    pub completed: u32,
    pub partial: u32,
    pub skipped: u32,
    pub errors: u32,
    pub documents_approved: u32,
    pub documents_rejected: u32,
    pub documents_errors: u32,
    pub documents_skipped: u32,
}

impl RunTotals {
    fn absorb(&mut self, result: &SubjectResult) {
        self.processed += 1;
        match result.status {
            SubjectStatus::Completed => self.completed += 1,
            SubjectStatus::Partial => self.partial += 1,
            SubjectStatus::Skipped => self.skipped += 1,
            SubjectStatus::Error => self.errors += 1,
            SubjectStatus::Processing => {}
        }
        self.documents_approved += result.counters.approved;
        self.documents_rejected += result.counters.rejected;
        self.documents_errors += result.counters.errors;
        self.documents_skipped += result.counters.skipped;
    }
}

/// A batch run with full per-subject detail, kept only while it is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub totals: RunTotals,
    pub subjects: Vec<SubjectResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id.clone(),
            status: self.status,
            trigger: self.trigger,
            started_at: self.started_at,
            finished_at: self.finished_at,
            totals: self.totals,
            error: self.error.clone(),
        }
    }
}

/// What survives of a run once it is finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: RunId,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub totals: RunTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run lookup result: full detail while active, summary once finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "run", rename_all = "snake_case")]
pub enum RunView {
    Active(Run),
    Finished(RunSummary),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a verification run is already in progress")]
    Busy,
    #[error("invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
    #[error("run {0} not found")]
    RunNotFound(String),
    #[error("no cached result for subject {0}")]
    SubjectNotCached(String),
    #[error("scheduler failure: {0}")]
    Scheduler(String),
    #[error("subject review task failed: {0}")]
    Interrupted(String),
}

/// Exclusive run slot plus the state that lives only while it is held.
///
/// Holding a [`RunGuard`] means holding the slot. However the holder ends, finalized
/// or dropped mid-await, the guard clears the active run and stop token first.
#[derive(Debug, Clone, Default)]
struct RunSlot {
    taken: Arc<AtomicBool>,
    active: Arc<Mutex<Option<Run>>>,
    stop: Arc<Mutex<Option<CancellationToken>>>,
}

impl RunSlot {
    fn try_acquire(&self) -> Option<RunGuard> {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { slot: self.clone() })
    }

    fn is_taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct RunGuard {
    slot: RunSlot,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.slot
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.slot
            .stop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        // Release last so a new holder never sees this run's leftovers.
        self.slot.taken.store(false, Ordering::Release);
    }
}

/// A batch that owns the run slot but has not started processing yet.
pub struct BatchTicket {
    guard: RunGuard,
    run_id: RunId,
    stop: CancellationToken,
}

impl BatchTicket {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

/// Owns the run lifecycle, mutual exclusion, cooperative cancellation, and run bookkeeping.
pub struct Orchestrator<S, F, B> {
    source: Arc<S>,
    fetcher: Arc<F>,
    backend: Arc<B>,
    settings: RwLock<VerificationSettings>,
    journal: Journal,
    history: Mutex<RunHistory>,
    results: ResultCache,
    slot: RunSlot,
    sequence: AtomicU64,
}

impl<S, F, B> Orchestrator<S, F, B>
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    pub fn new(
        source: Arc<S>,
        fetcher: Arc<F>,
        backend: Arc<B>,
        settings: VerificationSettings,
    ) -> Self {
        Self::with_capacities(
            source,
            fetcher,
            backend,
            settings,
            DEFAULT_LOG_CAPACITY,
            DEFAULT_HISTORY_CAPACITY,
        )
    }

    pub fn with_capacities(
        source: Arc<S>,
        fetcher: Arc<F>,
        backend: Arc<B>,
        settings: VerificationSettings,
        log_capacity: usize,
        history_capacity: usize,
    ) -> Self {
        Self {
            source,
            fetcher,
            backend,
            settings: RwLock::new(settings),
            journal: Journal::with_capacity(log_capacity),
            history: Mutex::new(RunHistory::with_capacity(history_capacity)),
            results: ResultCache::default(),
            slot: RunSlot::default(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> VerificationSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn replace_settings(&self, next: VerificationSettings) {
        let mut guard = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_taken()
    }

    pub fn stop_requested(&self) -> bool {
        self.lock_stop()
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Raise the cooperative stop flag on whatever currently holds the run slot.
    pub fn request_stop(&self) -> bool {
        let token = self.lock_stop().clone();
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                self.journal.warn("stop requested for the active run", None);
                true
            }
            _ => false,
        }
    }

    /// Run a full batch to completion. Returns `None` when another run holds the slot.
    pub async fn run_batch(&self, trigger: RunTrigger) -> Option<RunSummary> {
        let ticket = self.begin_batch(trigger)?;
        Some(self.drive_batch(ticket).await)
    }

    /// Claim the slot synchronously and continue the batch on a background task.
    pub fn start_batch(self: &Arc<Self>, trigger: RunTrigger) -> Result<RunId, OrchestratorError> {
        let ticket = self.begin_batch(trigger).ok_or(OrchestratorError::Busy)?;
        let run_id = ticket.run_id().clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive_batch(ticket).await;
        });
        Ok(run_id)
    }

    /// Claim the run slot and register a new `Running` run.
    pub fn begin_batch(&self, trigger: RunTrigger) -> Option<BatchTicket> {
        let Some(guard) = self.slot.try_acquire() else {
            self.journal.warn(
                format!(
                    "{} run requested while another run is active; ignoring",
                    trigger.label()
                ),
                None,
            );
            return None;
        };

        let started_at = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let run_id = RunId(format!(
            "run-{}-{sequence:04}",
            started_at.format("%Y%m%dT%H%M%S")
        ));
        let stop = CancellationToken::new();

        *self.lock_active() = Some(Run {
            id: run_id.clone(),
            status: RunStatus::Running,
            trigger,
            started_at,
            finished_at: None,
            totals: RunTotals::default(),
            subjects: Vec::new(),
            error: None,
        });
        *self.lock_stop() = Some(stop.clone());

        self.journal.info(
            format!("{} run {run_id} started", trigger.label()),
            Some(json!({ "run_id": run_id.0 })),
        );

        Some(BatchTicket {
            guard,
            run_id,
            stop,
        })
    }

    pub async fn drive_batch(&self, ticket: BatchTicket) -> RunSummary {
        let settings = self.settings();
        let retry = settings.retry_policy();

        let subjects = retry
            .run("list subjects", &self.journal, || self.source.list_subjects())
            .await;
        let subjects = match subjects {
            Ok(subjects) => subjects,
            Err(error) => {
                self.journal.error(
                    format!("run {} aborted: could not list subjects", ticket.run_id),
                    Some(json!({ "error": error.message() })),
                );
                return self.finalize(ticket, RunStatus::Error, Some(error.message().to_string()));
            }
        };

        self.with_active(|run| run.totals.subjects = subjects.len() as u32);
        self.journal.info(
            format!("run {}: {} subjects to review", ticket.run_id, subjects.len()),
            None,
        );

        let processor = SubjectProcessor::new(
            self.source.as_ref(),
            self.fetcher.as_ref(),
            self.backend.as_ref(),
            &self.journal,
            &settings,
        );
        let subject_delay = settings.subject_delay();
        let mut status = RunStatus::Completed;

        for (position, subject) in subjects.iter().enumerate() {
            if position > 0 && !subject_delay.is_zero() {
                tokio::time::sleep(subject_delay).await;
            }
            if ticket.stop.is_cancelled() {
                self.journal.warn(
                    format!(
                        "run {} stopped before {} ({} of {} subjects processed)",
                        ticket.run_id,
                        subject.name,
                        position,
                        subjects.len()
                    ),
                    None,
                );
                status = RunStatus::Stopped;
                break;
            }

            let result = processor.process(subject, &ticket.stop).await;
            self.results.store(result.clone());
            self.with_active(|run| {
                run.totals.absorb(&result);
                run.subjects.push(result);
            });
        }

        if status == RunStatus::Completed && ticket.stop.is_cancelled() {
            status = RunStatus::Stopped;
        }

        self.finalize(ticket, status, None)
    }

    fn finalize(
        &self,
        ticket: BatchTicket,
        status: RunStatus,
        error: Option<String>,
    ) -> RunSummary {
        let BatchTicket { guard, run_id, .. } = ticket;
        let finished_at = Utc::now();

        let summary = {
            let mut active = self.lock_active();
            let mut run = active.take().unwrap_or_else(|| Run {
                id: run_id.clone(),
                status,
                trigger: RunTrigger::Manual,
                started_at: finished_at,
                finished_at: None,
                totals: RunTotals::default(),
                subjects: Vec::new(),
                error: None,
            });
            run.status = status;
            run.finished_at = Some(finished_at);
            run.error = error;
            run.summary()
        };

        self.lock_history().push(summary.clone());
        *self.lock_stop() = None;

        let payload = json!({ "run_id": run_id.0, "totals": summary.totals });
        match status {
            RunStatus::Error => self
                .journal
                .error(format!("run {run_id} finished with status error"), Some(payload)),
            RunStatus::Stopped => self
                .journal
                .warn(format!("run {run_id} stopped"), Some(payload)),
            _ => self.journal.info(
                format!("run {run_id} finished with status {}", status.label()),
                Some(payload),
            ),
        }

        drop(guard);
        summary
    }

    /// Verify one subject right away.
    ///
    /// Fails with [`OrchestratorError::Busy`] while any run is active.
    ///
    /// The review runs on its own task and completes, cache and write-back included,
    /// even if the caller stops waiting.
    pub async fn verify_subject(
        self: &Arc<Self>,
        subject: SubjectRef,
    ) -> Result<SubjectResult, OrchestratorError> {
        let guard = self.slot.try_acquire().ok_or_else(|| {
            self.journal.warn(
                format!("single-subject review for {} rejected: busy", subject.id),
                None,
            );
            OrchestratorError::Busy
        })?;

        let stop = CancellationToken::new();
        *self.lock_stop() = Some(stop.clone());

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = this.review_subject(&subject, &stop).await;
            drop(guard);
            result
        });
        task.await.map_err(|err| OrchestratorError::Interrupted(err.to_string()))
    }

    async fn review_subject(
        &self,
        subject: &SubjectRef,
        stop: &CancellationToken,
    ) -> SubjectResult {
        let settings = self.settings();
        self.journal.info(
            format!("single-subject review started for {}", subject.name),
            Some(json!({ "subject_id": subject.id })),
        );
        let processor = SubjectProcessor::new(
            self.source.as_ref(),
            self.fetcher.as_ref(),
            self.backend.as_ref(),
            &self.journal,
            &settings,
        );
        let result = processor.process(subject, stop).await;
        self.results.store(result.clone());
        result
    }

    pub fn active_run(&self) -> Option<Run> {
        self.lock_active().clone()
    }

    pub fn run_detail(&self, run_id: &str) -> Result<RunView, OrchestratorError> {
        if let Some(run) = self.lock_active().as_ref().filter(|run| run.id.0 == run_id) {
            return Ok(RunView::Active(run.clone()));
        }
        self.lock_history()
            .find(run_id)
            .map(RunView::Finished)
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))
    }

    pub fn history(&self, limit: usize) -> Vec<RunSummary> {
        self.lock_history().recent(limit)
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.lock_history().latest().cloned()
    }

    pub fn cached_result(&self, subject_id: &str) -> Result<SubjectResult, OrchestratorError> {
        self.results
            .get(subject_id)
            .ok_or_else(|| OrchestratorError::SubjectNotCached(subject_id.to_string()))
    }

    pub fn cached_results(&self) -> Vec<SubjectResultSummary> {
        self.results.summaries()
    }

    pub fn cached_count(&self) -> usize {
        self.results.len()
    }

    fn with_active(&self, apply: impl FnOnce(&mut Run)) {
        if let Some(run) = self.lock_active().as_mut() {
            apply(run);
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<Run>> {
        self.slot
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_stop(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.slot
            .stop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, RunHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
