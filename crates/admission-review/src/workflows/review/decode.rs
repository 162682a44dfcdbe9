use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::domain::{DocumentContent, DocumentDescriptor, OutcomeStatus, VerificationOutcome};
use super::ports::VerificationBackend;
use super::retry::RemoteError;

/// Backend transport that returns the model's raw text answer.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        content: &DocumentContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<String, RemoteError>;
}

/// Adapts a raw-text backend into a [`VerificationBackend`], decoding each answer strictly.
///
/// Transport failures still propagate so the retry policy can act on them; shape
/// violations in an answer that did arrive become a rejection.
#[derive(Debug, Clone)]
pub struct ResponseDecodingBackend<C> {
    client: C,
}

impl<C> ResponseDecodingBackend<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> VerificationBackend for ResponseDecodingBackend<C>
where
    C: CompletionClient,
{
    async fn verify(
        &self,
        content: &DocumentContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<VerificationOutcome, RemoteError> {
        let raw = self.client.complete(content, descriptor).await?;
        Ok(decode_outcome(&raw))
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeViolation {
    #[error("no JSON object found")]
    MissingObject,
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("unsupported status '{0}'")]
    Status(String),
    #[error("confidence {0} outside [0, 1]")]
    Confidence(String),
    #[error("extracted field '{0}' is not a scalar")]
    ExtractedField(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutcome {
    status: String,
    confidence: f64,
    remark: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    extracted_data: Option<BTreeMap<String, Value>>,
}

/// Decode a backend answer, degrading to a rejection on any shape violation.
pub fn decode_outcome(raw: &str) -> VerificationOutcome {
    match try_decode(raw) {
        Ok(outcome) => outcome,
        Err(violation) => VerificationOutcome::rejected(
            0.0,
            format!("unreadable verification response: {violation}"),
        )
        .with_issues(vec!["backend response failed validation".to_string()]),
    }
}

pub fn try_decode(raw: &str) -> Result<VerificationOutcome, DecodeViolation> {
    let body = extract_object(raw).ok_or(DecodeViolation::MissingObject)?;
    let parsed: RawOutcome =
        serde_json::from_str(body).map_err(|err| DecodeViolation::Json(err.to_string()))?;

    let status = match parsed.status.trim().to_ascii_lowercase().as_str() {
        "approved" => OutcomeStatus::Approved,
        "rejected" => OutcomeStatus::Rejected,
        _ => return Err(DecodeViolation::Status(parsed.status)),
    };

    if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(DecodeViolation::Confidence(parsed.confidence.to_string()));
    }

    let extracted_data = parsed
        .extracted_data
        .map(|fields| {
            fields
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| match value {
                    Value::String(text) => Ok((key, text)),
                    Value::Number(_) | Value::Bool(_) => Ok((key, value.to_string())),
                    _ => Err(DecodeViolation::ExtractedField(key)),
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
        })
        .transpose()?;

    Ok(VerificationOutcome {
        status,
        confidence: parsed.confidence as f32,
        remark: parsed.remark,
        issues: parsed.issues,
        extracted_data,
    })
}

/// Locate the outermost `{ ... }` span, tolerating code fences and prose around it.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
