use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to an applicant whose documents are reviewed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub id: String,
    pub name: String,
}

impl SubjectRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One required or optional document slot for a subject, as supplied by the work source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub label: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub content_ref: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub verified: bool,
}

impl WorkItem {
    pub fn has_content(&self) -> bool {
        self.content_ref
            .as_deref()
            .map(|reference| !reference.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Item listing returned by the work source; `ok == false` signals "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemListing {
    pub ok: bool,
    pub items: Vec<WorkItem>,
}

/// Raw document bytes plus the content-type hint reported by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Everything the verification backend learns about the requirement besides the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub label: String,
    pub category: String,
    pub description: String,
    pub content_type: String,
}

impl DocumentDescriptor {
    pub fn for_item(item: &WorkItem, content_type: &str) -> Self {
        Self {
            label: item.label.clone(),
            category: item.category.clone(),
            description: item.description.clone(),
            content_type: content_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Approved,
    Rejected,
    Skipped,
    Error,
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Approved => "approved",
            OutcomeStatus::Rejected => "rejected",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured result of verifying one work item in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: OutcomeStatus,
    pub confidence: f32,
    pub remark: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<BTreeMap<String, String>>,
}

impl VerificationOutcome {
    pub fn approved(confidence: f32, remark: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Approved, confidence, remark)
    }

    pub fn rejected(confidence: f32, remark: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Rejected, confidence, remark)
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self::with_status(OutcomeStatus::Skipped, 0.0, reason.remark())
    }

    pub fn error(remark: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Error, 0.0, remark)
    }

    fn with_status(status: OutcomeStatus, confidence: f32, remark: impl Into<String>) -> Self {
        Self {
            status,
            confidence: confidence.clamp(0.0, 1.0),
            remark: remark.into(),
            issues: Vec::new(),
            extracted_data: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }
}

/// Why an item was recorded as skipped.
///
/// `Declined` is the only reason that comes from the backend itself; the other two
/// are decided before any backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotUploaded,
    AlreadyVerified,
    Declined,
}

impl SkipReason {
    pub fn remark(&self) -> &'static str {
        match self {
            SkipReason::NotUploaded => "no document uploaded",
            SkipReason::AlreadyVerified => "already verified",
            SkipReason::Declined => "verification declined by backend",
        }
    }
}

/// A work item merged with whatever this run learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedItem {
    pub item: WorkItem,
    pub outcome: Option<VerificationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Processing,
    Completed,
    Partial,
    Skipped,
    Error,
}

impl SubjectStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SubjectStatus::Processing => "processing",
            SubjectStatus::Completed => "completed",
            SubjectStatus::Partial => "partial",
            SubjectStatus::Skipped => "skipped",
            SubjectStatus::Error => "error",
        }
    }
}

impl fmt::Display for SubjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-subject tallies.
///
/// `total` counts uploaded items (those eligible for verification). Items without
/// content are folded into `skipped` but never into `total`, so for a finished
/// subject `approved + rejected + errors + skipped_already_verified + skipped_declined`
/// equals `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCounters {
    pub total: u32,
    pub uploaded: u32,
    pub approved: u32,
    pub rejected: u32,
    pub errors: u32,
    pub skipped: u32,
    pub skipped_not_uploaded: u32,
    pub skipped_already_verified: u32,
    pub skipped_declined: u32,
}

impl SubjectCounters {
    pub(crate) fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        match reason {
            SkipReason::NotUploaded => self.skipped_not_uploaded += 1,
            SkipReason::AlreadyVerified => self.skipped_already_verified += 1,
            SkipReason::Declined => self.skipped_declined += 1,
        }
    }

    pub(crate) fn record_outcome(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Approved => self.approved += 1,
            OutcomeStatus::Rejected => self.rejected += 1,
            OutcomeStatus::Error => self.errors += 1,
            OutcomeStatus::Skipped => self.record_skip(SkipReason::Declined),
        }
    }
}

/// Last-known verification result for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub subject_id: String,
    pub subject_name: String,
    pub status: SubjectStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counters: SubjectCounters,
    pub items: Vec<AnnotatedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubjectResult {
    pub fn begin(subject: &SubjectRef, started_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            status: SubjectStatus::Processing,
            started_at,
            finished_at: None,
            counters: SubjectCounters::default(),
            items: Vec::new(),
            error: None,
        }
    }

    pub fn summary(&self) -> SubjectResultSummary {
        SubjectResultSummary {
            subject_id: self.subject_id.clone(),
            subject_name: self.subject_name.clone(),
            status: self.status,
            counters: self.counters,
            finished_at: self.finished_at,
        }
    }
}

/// Projection of a cached result without the item list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectResultSummary {
    pub subject_id: String,
    pub subject_name: String,
    pub status: SubjectStatus,
    pub counters: SubjectCounters,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-item status line written back to the work source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub item_id: String,
    pub status: OutcomeStatus,
    pub remark: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_content_reference_counts_as_missing() {
        let mut item = WorkItem {
            id: "doc-1".to_string(),
            label: "Transcript".to_string(),
            category: "academic".to_string(),
            description: "Final year transcript".to_string(),
            content_ref: Some("   ".to_string()),
            required: true,
            verified: false,
        };
        assert!(!item.has_content());

        item.content_ref = Some("uploads/doc-1.pdf".to_string());
        assert!(item.has_content());
    }

    #[test]
    fn outcome_confidence_is_clamped() {
        assert_eq!(VerificationOutcome::approved(1.7, "ok").confidence, 1.0);
        assert_eq!(VerificationOutcome::rejected(-0.2, "bad").confidence, 0.0);
    }

    #[test]
    fn skip_reasons_are_tracked_separately() {
        let mut counters = SubjectCounters::default();
        counters.record_skip(SkipReason::NotUploaded);
        counters.record_skip(SkipReason::AlreadyVerified);
        counters.record_skip(SkipReason::AlreadyVerified);

        assert_eq!(counters.skipped, 3);
        assert_eq!(counters.skipped_not_uploaded, 1);
        assert_eq!(counters.skipped_already_verified, 2);
    }

    #[test]
    fn backend_skip_answers_count_as_declined() {
        let mut counters = SubjectCounters::default();
        counters.record_outcome(OutcomeStatus::Skipped);

        assert_eq!(counters.skipped, 1);
        assert_eq!(counters.skipped_declined, 1);
        assert_eq!(counters.skipped_already_verified, 0);
    }
}
