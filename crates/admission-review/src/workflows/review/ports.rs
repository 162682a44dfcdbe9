//! Contracts for the collaborators the orchestrator drives but does not own.

use async_trait::async_trait;

use super::domain::{
    DocumentContent, DocumentDescriptor, StatusReport, SubjectRef, VerificationOutcome,
    WorkItemListing,
};
use super::retry::RemoteError;

/// Supplies subjects and their document slots, and accepts status write-backs.
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<SubjectRef>, RemoteError>;

    async fn list_work_items(&self, subject: &SubjectRef) -> Result<WorkItemListing, RemoteError>;

    async fn report_status(
        &self,
        subject: &SubjectRef,
        reports: &[StatusReport],
    ) -> Result<(), RemoteError>;
}

/// Resolves a content reference to raw bytes and a content-type hint.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<DocumentContent, RemoteError>;
}

/// Judges a document against its requirement.
///
/// Implementations must not fail on malformed model output; see
/// [`ResponseDecodingBackend`](super::decode::ResponseDecodingBackend).
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    async fn verify(
        &self,
        content: &DocumentContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<VerificationOutcome, RemoteError>;
}
