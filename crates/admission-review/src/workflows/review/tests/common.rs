use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::review::domain::{
    DocumentContent, DocumentDescriptor, StatusReport, SubjectRef, VerificationOutcome, WorkItem,
    WorkItemListing,
};
use crate::workflows::review::orchestrator::Orchestrator;
use crate::workflows::review::ports::{ContentFetcher, VerificationBackend, WorkSource};
use crate::workflows::review::retry::RemoteError;
use crate::workflows::review::settings::VerificationSettings;

pub(super) type TestOrchestrator = Orchestrator<ScriptedSource, MemoryContent, ScriptedBackend>;

pub(super) fn subject(id: &str) -> SubjectRef {
    SubjectRef::new(id, format!("Applicant {id}"))
}

pub(super) fn item(id: &str, label: &str, content_ref: Option<&str>) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        label: label.to_string(),
        category: "admission".to_string(),
        description: format!("{label} required for enrollment"),
        content_ref: content_ref.map(str::to_string),
        required: true,
        verified: false,
    }
}

pub(super) fn verified_item(id: &str, label: &str, content_ref: &str) -> WorkItem {
    WorkItem {
        verified: true,
        ..item(id, label, Some(content_ref))
    }
}

pub(super) fn settings() -> VerificationSettings {
    VerificationSettings {
        concurrency: 2,
        retry_attempts: 3,
        retry_delay_ms: 10,
        item_delay_ms: 0,
        subject_delay_ms: 0,
        ..VerificationSettings::default()
    }
}

pub(super) fn orchestrator(
    source: Arc<ScriptedSource>,
    content: Arc<MemoryContent>,
    backend: Arc<ScriptedBackend>,
    settings: VerificationSettings,
) -> Arc<TestOrchestrator> {
    Arc::new(Orchestrator::new(source, content, backend, settings))
}

type ReportHook = Box<dyn Fn(&SubjectRef) + Send + Sync>;

/// Work source with canned subjects and listings that records write-backs.
#[derive(Default)]
pub(super) struct ScriptedSource {
    subjects: Vec<SubjectRef>,
    subject_list_failure: Option<RemoteError>,
    listings: HashMap<String, Result<WorkItemListing, RemoteError>>,
    fail_reports: bool,
    pub(super) subject_list_calls: AtomicU32,
    reports: Mutex<Vec<(String, Vec<StatusReport>)>>,
    after_report: OnceLock<ReportHook>,
}

impl ScriptedSource {
    pub(super) fn new(subjects: Vec<SubjectRef>) -> Self {
        Self {
            subjects,
            ..Self::default()
        }
    }

    pub(super) fn with_items(mut self, subject_id: &str, items: Vec<WorkItem>) -> Self {
        self.listings
            .insert(subject_id.to_string(), Ok(WorkItemListing { ok: true, items }));
        self
    }

    pub(super) fn with_no_data(mut self, subject_id: &str) -> Self {
        self.listings
            .insert(subject_id.to_string(), Ok(WorkItemListing::default()));
        self
    }

    pub(super) fn with_listing_error(mut self, subject_id: &str, message: &str) -> Self {
        self.listings
            .insert(subject_id.to_string(), Err(RemoteError::new(message)));
        self
    }

    pub(super) fn failing_subject_list(mut self, message: &str) -> Self {
        self.subject_list_failure = Some(RemoteError::new(message));
        self
    }

    pub(super) fn failing_reports(mut self) -> Self {
        self.fail_reports = true;
        self
    }

    pub(super) fn on_report(&self, hook: impl Fn(&SubjectRef) + Send + Sync + 'static) {
        if self.after_report.set(Box::new(hook)).is_err() {
            panic!("report hook already installed");
        }
    }

    pub(super) fn reports(&self) -> Vec<(String, Vec<StatusReport>)> {
        self.reports.lock().expect("reports mutex poisoned").clone()
    }
}

#[async_trait]
impl WorkSource for ScriptedSource {
    async fn list_subjects(&self) -> Result<Vec<SubjectRef>, RemoteError> {
        self.subject_list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.subject_list_failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.subjects.clone()),
        }
    }

    async fn list_work_items(&self, subject: &SubjectRef) -> Result<WorkItemListing, RemoteError> {
        self.listings
            .get(&subject.id)
            .cloned()
            .unwrap_or_else(|| Ok(WorkItemListing::default()))
    }

    async fn report_status(
        &self,
        subject: &SubjectRef,
        reports: &[StatusReport],
    ) -> Result<(), RemoteError> {
        self.reports
            .lock()
            .expect("reports mutex poisoned")
            .push((subject.id.clone(), reports.to_vec()));
        if let Some(hook) = self.after_report.get() {
            hook(subject);
        }
        if self.fail_reports {
            return Err(RemoteError::transient("write-back endpoint returned 503"));
        }
        Ok(())
    }
}

/// Content store keyed by reference; unknown references fail like a missing object.
#[derive(Default)]
pub(super) struct MemoryContent {
    documents: HashMap<String, DocumentContent>,
    pub(super) fetches: AtomicU32,
}

impl MemoryContent {
    pub(super) fn with_pdf(mut self, reference: &str) -> Self {
        self.documents.insert(
            reference.to_string(),
            DocumentContent {
                bytes: format!("%PDF-1.7 {reference}").into_bytes(),
                content_type: "application/pdf".to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl ContentFetcher for MemoryContent {
    async fn fetch(&self, reference: &str) -> Result<DocumentContent, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(reference)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("object {reference} not found")))
    }
}

/// Backend answering from per-label scripts, approving anything unscripted.
#[derive(Default)]
pub(super) struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Result<VerificationOutcome, RemoteError>>>>,
    calls: Mutex<Vec<String>>,
    hold: Duration,
    in_flight: AtomicUsize,
    pub(super) peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub(super) fn holding_for(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub(super) fn script(
        self,
        label: &str,
        responses: Vec<Result<VerificationOutcome, RemoteError>>,
    ) -> Self {
        self.scripts
            .lock()
            .expect("script mutex poisoned")
            .insert(label.to_string(), responses.into());
        self
    }

    pub(super) fn calls_for(&self, label: &str) -> usize {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .iter()
            .filter(|called| called.as_str() == label)
            .count()
    }

    pub(super) fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls mutex poisoned").len()
    }
}

#[async_trait]
impl VerificationBackend for ScriptedBackend {
    async fn verify(
        &self,
        _content: &DocumentContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<VerificationOutcome, RemoteError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(descriptor.label.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .expect("script mutex poisoned")
            .get_mut(&descriptor.label)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(VerificationOutcome::approved(0.9, "meets requirement")))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
