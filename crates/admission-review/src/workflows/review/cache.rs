use std::collections::HashMap;
use std::sync::RwLock;

use super::domain::{SubjectResult, SubjectResultSummary};

/// Last verification result per subject. Each new result replaces the previous one.
#[derive(Debug, Default)]
pub struct ResultCache {
    results: RwLock<HashMap<String, SubjectResult>>,
}

impl ResultCache {
    pub fn store(&self, result: SubjectResult) {
        let mut guard = self
            .results
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(result.subject_id.clone(), result);
    }

    pub fn get(&self, subject_id: &str) -> Option<SubjectResult> {
        let guard = self
            .results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(subject_id).cloned()
    }

    /// Summary projection of every cached subject, ordered by subject id.
    pub fn summaries(&self) -> Vec<SubjectResultSummary> {
        let guard = self
            .results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut summaries: Vec<_> = guard.values().map(SubjectResult::summary).collect();
        summaries.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
