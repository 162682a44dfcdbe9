//! Batch verification of applicant documents against admission requirements.
//!
//! The [`Orchestrator`] pulls subjects from a [`WorkSource`], pushes each uploaded
//! document through the [`WorkerPool`] to a [`VerificationBackend`] under the
//! [`RetryPolicy`], and writes outcomes back. [`ReviewService`] pairs it with the
//! cron-driven [`ScheduleTrigger`] and backs the admin [`review_router`].

pub mod cache;
pub mod decode;
pub mod domain;
pub mod journal;
pub mod orchestrator;
pub mod pool;
pub mod ports;
pub mod processor;
pub mod retry;
pub mod router;
pub mod service;
pub mod settings;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use cache::ResultCache;
pub use decode::{decode_outcome, CompletionClient, DecodeViolation, ResponseDecodingBackend};
pub use domain::{
    AnnotatedItem, DocumentContent, DocumentDescriptor, OutcomeStatus, SkipReason, StatusReport,
    SubjectCounters, SubjectRef, SubjectResult, SubjectResultSummary, SubjectStatus,
    VerificationOutcome, WorkItem, WorkItemListing,
};
pub use journal::{BoundedBuffer, Journal, LogEntry, LogLevel, RunHistory};
pub use orchestrator::{
    BatchTicket, Orchestrator, OrchestratorError, Run, RunId, RunStatus, RunSummary, RunTotals,
    RunTrigger, RunView,
};
pub use pool::{PoolRun, WorkerPool};
pub use ports::{ContentFetcher, VerificationBackend, WorkSource};
pub use processor::SubjectProcessor;
pub use retry::{FailureClass, RemoteError, RetryPolicy};
pub use router::review_router;
pub use service::{ReviewService, ReviewStatus};
pub use settings::{SettingsError, SettingsUpdate, VerificationSettings, DEFAULT_SCHEDULE};
pub use trigger::{validate_schedule, ScheduleTrigger, TriggerStatus};
