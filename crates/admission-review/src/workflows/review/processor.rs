use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::domain::{
    AnnotatedItem, DocumentDescriptor, OutcomeStatus, SkipReason, StatusReport, SubjectRef,
    SubjectResult, SubjectStatus, VerificationOutcome, WorkItem,
};
use super::journal::Journal;
use super::ports::{ContentFetcher, VerificationBackend, WorkSource};
use super::retry::RemoteError;
use super::settings::VerificationSettings;

/// Drives one subject's documents through fetch, filter, verify, merge, and write-back.
pub struct SubjectProcessor<'a, S, F, B> {
    source: &'a S,
    fetcher: &'a F,
    backend: &'a B,
    journal: &'a Journal,
    settings: &'a VerificationSettings,
}

impl<'a, S, F, B> SubjectProcessor<'a, S, F, B>
where
    S: WorkSource,
    F: ContentFetcher,
    B: VerificationBackend,
{
    pub fn new(
        source: &'a S,
        fetcher: &'a F,
        backend: &'a B,
        journal: &'a Journal,
        settings: &'a VerificationSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            backend,
            journal,
            settings,
        }
    }

    pub async fn process(&self, subject: &SubjectRef, stop: &CancellationToken) -> SubjectResult {
        let mut result = SubjectResult::begin(subject, Utc::now());
        let retry = self.settings.retry_policy();

        let listing = retry
            .run(
                &format!("list documents for {}", subject.id),
                self.journal,
                || self.source.list_work_items(subject),
            )
            .await;

        let listing = match listing {
            Ok(listing) => listing,
            Err(error) => {
                self.journal.error(
                    format!("could not load documents for {}", subject.name),
                    Some(json!({ "subject_id": subject.id, "error": error.message() })),
                );
                result.status = SubjectStatus::Error;
                result.error = Some(error.message().to_string());
                result.finished_at = Some(Utc::now());
                return result;
            }
        };

        if !listing.ok {
            self.journal.info(
                format!("no document data for {}, skipping", subject.name),
                Some(json!({ "subject_id": subject.id })),
            );
            result.status = SubjectStatus::Skipped;
            result.finished_at = Some(Utc::now());
            return result;
        }

        let items = listing.items;
        let mut slots: Vec<(Option<VerificationOutcome>, Option<SkipReason>)> =
            vec![(None, None); items.len()];
        let mut candidates = Vec::new();

        for (index, item) in items.iter().enumerate() {
            let skip = if !item.has_content() {
                Some(SkipReason::NotUploaded)
            } else {
                result.counters.uploaded += 1;
                result.counters.total += 1;
                (self.settings.skip_already_verified && item.verified)
                    .then_some(SkipReason::AlreadyVerified)
            };

            match skip {
                Some(reason) => {
                    result.counters.record_skip(reason);
                    slots[index] = (Some(VerificationOutcome::skipped(reason)), Some(reason));
                }
                None => candidates.push(index),
            }
        }

        self.journal.info(
            format!("processing {} documents for {}", candidates.len(), subject.name),
            Some(json!({
                "subject_id": subject.id,
                "uploaded": result.counters.uploaded,
                "not_uploaded": result.counters.skipped_not_uploaded,
                "already_verified": result.counters.skipped_already_verified,
            })),
        );

        let candidate_count = candidates.len();
        let pool_run = self
            .settings
            .worker_pool()
            .run(candidates, stop, |index| {
                let item = &items[index];
                async move { (index, self.verify_item(subject, item).await) }
            })
            .await;

        let settled = pool_run.settled.len();
        for (index, outcome) in pool_run.settled {
            result.counters.record_outcome(outcome.status);
            let skip_reason =
                (outcome.status == OutcomeStatus::Skipped).then_some(SkipReason::Declined);
            slots[index] = (Some(outcome), skip_reason);
        }

        result.items = items
            .into_iter()
            .zip(slots)
            .map(|(item, (outcome, skip_reason))| AnnotatedItem {
                item,
                outcome,
                skip_reason,
            })
            .collect();

        if pool_run.halted {
            self.journal.warn(
                format!(
                    "stop requested; {} of {} documents for {} left unverified",
                    candidate_count - settled,
                    candidate_count,
                    subject.name
                ),
                Some(json!({ "subject_id": subject.id })),
            );
        }

        self.write_back(subject, &result.items).await;

        result.status = if candidate_count == 0 {
            SubjectStatus::Skipped
        } else if settled > 0 && result.counters.errors as usize == settled {
            SubjectStatus::Error
        } else if result.counters.errors > 0 || pool_run.halted {
            SubjectStatus::Partial
        } else {
            SubjectStatus::Completed
        };
        result.finished_at = Some(Utc::now());

        self.journal.info(
            format!("{} finished with status {}", subject.name, result.status),
            Some(json!({ "subject_id": subject.id, "counters": result.counters })),
        );
        result
    }

    async fn verify_item(&self, subject: &SubjectRef, item: &WorkItem) -> VerificationOutcome {
        let Some(reference) = item.content_ref.as_deref() else {
            return VerificationOutcome::skipped(SkipReason::NotUploaded);
        };
        let label = format!("verify {} / {}", subject.id, item.label);

        let verified = self
            .settings
            .retry_policy()
            .run(&label, self.journal, || async move {
                let content = self.fetcher.fetch(reference).await.map_err(|error| {
                    RemoteError::transient(format!("content fetch failed: {}", error.message()))
                })?;
                let descriptor = DocumentDescriptor::for_item(item, &content.content_type);
                self.backend.verify(&content, &descriptor).await
            })
            .await;

        match verified {
            Ok(outcome) => outcome,
            Err(error) => VerificationOutcome::error(error.message()),
        }
    }

    async fn write_back(&self, subject: &SubjectRef, items: &[AnnotatedItem]) {
        let reports: Vec<StatusReport> = items
            .iter()
            .filter_map(|annotated| {
                let outcome = annotated.outcome.as_ref()?;
                (outcome.status != OutcomeStatus::Skipped).then(|| StatusReport {
                    item_id: annotated.item.id.clone(),
                    status: outcome.status,
                    remark: outcome.remark.clone(),
                })
            })
            .collect();

        if reports.is_empty() {
            return;
        }

        let reported = self
            .settings
            .retry_policy()
            .run(
                &format!("report status for {}", subject.id),
                self.journal,
                || self.source.report_status(subject, &reports),
            )
            .await;

        if let Err(error) = reported {
            self.journal.warn(
                format!("status write-back failed for {}", subject.name),
                Some(json!({ "subject_id": subject.id, "error": error.message() })),
            );
        }
    }
}
