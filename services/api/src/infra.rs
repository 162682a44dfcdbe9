use admission_review::config::ReviewConfig;
use admission_review::workflows::review::{
    CompletionClient, ContentFetcher, DocumentContent, DocumentDescriptor, Orchestrator,
    OutcomeStatus, RemoteError, ResponseDecodingBackend, ReviewService, StatusReport, SubjectRef,
    WorkItem, WorkItemListing, WorkSource,
};
use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub(crate) type DemoBackend = ResponseDecodingBackend<ContentTypeBackend>;
pub(crate) type DemoOrchestrator =
    Orchestrator<InMemoryWorkSource, InMemoryContentStore, DemoBackend>;
pub(crate) type DemoService = ReviewService<InMemoryWorkSource, InMemoryContentStore, DemoBackend>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Roster {
    subjects: Vec<SubjectRef>,
    items: HashMap<String, Vec<WorkItem>>,
}

/// Applicant roster held in memory. Approved write-backs mark items verified.
#[derive(Default, Clone)]
pub(crate) struct InMemoryWorkSource {
    roster: Arc<Mutex<Roster>>,
}

impl InMemoryWorkSource {
    pub(crate) fn enroll(&self, subject: SubjectRef, items: Vec<WorkItem>) {
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        roster.items.insert(subject.id.clone(), items);
        roster.subjects.push(subject);
    }

    pub(crate) fn items(&self, subject_id: &str) -> Vec<WorkItem> {
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        roster.items.get(subject_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl WorkSource for InMemoryWorkSource {
    async fn list_subjects(&self) -> Result<Vec<SubjectRef>, RemoteError> {
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        Ok(roster.subjects.clone())
    }

    async fn list_work_items(&self, subject: &SubjectRef) -> Result<WorkItemListing, RemoteError> {
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        Ok(match roster.items.get(&subject.id) {
            Some(items) => WorkItemListing {
                ok: true,
                items: items.clone(),
            },
            None => WorkItemListing::default(),
        })
    }

    async fn report_status(
        &self,
        subject: &SubjectRef,
        reports: &[StatusReport],
    ) -> Result<(), RemoteError> {
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        let items = roster
            .items
            .get_mut(&subject.id)
            .ok_or_else(|| RemoteError::new(format!("subject {} not found", subject.id)))?;
        for report in reports {
            if let Some(item) = items.iter_mut().find(|item| item.id == report.item_id) {
                item.verified = report.status == OutcomeStatus::Approved;
            }
        }
        Ok(())
    }
}

/// Uploaded documents keyed by storage path; the content type is guessed from the extension.
#[derive(Default, Clone)]
pub(crate) struct InMemoryContentStore {
    objects: Arc<Mutex<HashMap<String, DocumentContent>>>,
}

impl InMemoryContentStore {
    pub(crate) fn put(&self, reference: &str, bytes: impl Into<Vec<u8>>) {
        let content_type = mime_guess::from_path(reference)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects.insert(
            reference.to_string(),
            DocumentContent {
                bytes: bytes.into(),
                content_type,
            },
        );
    }
}

#[async_trait]
impl ContentFetcher for InMemoryContentStore {
    async fn fetch(&self, reference: &str) -> Result<DocumentContent, RemoteError> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects
            .get(reference)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("object {reference} not found in store")))
    }
}

const ACCEPTED_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];

/// Offline stand-in for a model backend. Answers in the same JSON shape a model would.
#[derive(Debug, Default, Clone)]
pub(crate) struct ContentTypeBackend;

#[async_trait]
impl CompletionClient for ContentTypeBackend {
    async fn complete(
        &self,
        content: &DocumentContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<String, RemoteError> {
        let mut issues = Vec::new();
        if content.bytes.is_empty() {
            issues.push("file is empty".to_string());
        }
        if !ACCEPTED_TYPES.contains(&descriptor.content_type.as_str()) {
            issues.push(format!("unsupported file type {}", descriptor.content_type));
        }

        let answer = if issues.is_empty() {
            json!({
                "status": "approved",
                "confidence": 0.6,
                "remark": format!("{} has an accepted format", descriptor.label),
                "extracted_data": {
                    "content_type": descriptor.content_type,
                    "size_bytes": content.bytes.len(),
                },
            })
        } else {
            json!({
                "status": "rejected",
                "confidence": 0.9,
                "remark": format!("{} cannot be accepted", descriptor.label),
                "issues": issues,
            })
        };
        Ok(answer.to_string())
    }
}

pub(crate) fn demo_backend() -> DemoBackend {
    ResponseDecodingBackend::new(ContentTypeBackend)
}

pub(crate) fn build_orchestrator(
    config: &ReviewConfig,
    source: InMemoryWorkSource,
    store: InMemoryContentStore,
) -> Arc<DemoOrchestrator> {
    Arc::new(Orchestrator::with_capacities(
        Arc::new(source),
        Arc::new(store),
        Arc::new(demo_backend()),
        config.settings.clone(),
        config.log_capacity,
        config.history_capacity,
    ))
}

fn requirement(id: &str, label: &str, category: &str, content_ref: Option<&str>) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        label: label.to_string(),
        category: category.to_string(),
        description: format!("{label} submitted with the admission application"),
        content_ref: content_ref.map(str::to_string),
        required: true,
        verified: false,
    }
}

/// Seed a small applicant roster covering approval, rejection, and missing uploads.
pub(crate) fn demo_fixture() -> (InMemoryWorkSource, InMemoryContentStore) {
    let source = InMemoryWorkSource::default();
    let store = InMemoryContentStore::default();

    store.put("applicants/a-100/transcript.pdf", b"%PDF-1.7 transcript".to_vec());
    store.put("applicants/a-100/passport.jpg", b"\xFF\xD8\xFF passport".to_vec());
    store.put("applicants/a-101/transcript.docx", b"PK docx".to_vec());
    store.put("applicants/a-101/photo.png", Vec::new());

    source.enroll(
        SubjectRef::new("a-100", "Amara Okafor"),
        vec![
            requirement("d-1", "Transcript", "academic", Some("applicants/a-100/transcript.pdf")),
            requirement("d-2", "Passport", "identity", Some("applicants/a-100/passport.jpg")),
            requirement("d-3", "Recommendation Letter", "academic", None),
        ],
    );
    source.enroll(
        SubjectRef::new("a-101", "Lucas Brandt"),
        vec![
            requirement("d-4", "Transcript", "academic", Some("applicants/a-101/transcript.docx")),
            requirement("d-5", "Photo", "identity", Some("applicants/a-101/photo.png")),
            requirement("d-6", "Passport", "identity", Some("applicants/a-101/passport.pdf")),
        ],
    );
    source.enroll(SubjectRef::new("a-102", "Mei Tanaka"), Vec::new());

    (source, store)
}
