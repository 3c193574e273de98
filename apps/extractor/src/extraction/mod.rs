//! Field Extractor: renders a field's prompt, asks the model, parses the reply.
//!
//! Nothing raises past this boundary: service errors, timeouts, missing labels
//! and unparseable values all resolve to the field's sentinel. The outcome
//! records which of those happened so the run summary can count them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::fields::parser::ParsedReply;
use crate::fields::{FieldSet, FieldSpec, FieldValue};
use crate::llm_client::{LlmError, TextGenerator};
use crate::loader::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Extracted,
    /// Reply had no usable value for the label.
    Absent,
    /// Label present, value not interpretable (numeric fields).
    Unparseable,
    /// Service error or timeout.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub value: FieldValue,
    pub status: FieldStatus,
}

impl FieldOutcome {
    fn sentinel(spec: &FieldSpec, status: FieldStatus) -> Self {
        Self {
            value: spec.sentinel.clone(),
            status,
        }
    }
}

/// Per-document (and, summed, per-run) field counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub extracted: usize,
    pub absent: usize,
    pub unparseable: usize,
    pub failed: usize,
    pub llm_calls: usize,
}

impl FieldStats {
    fn record(&mut self, status: FieldStatus) {
        match status {
            FieldStatus::Extracted => self.extracted += 1,
            FieldStatus::Absent => self.absent += 1,
            FieldStatus::Unparseable => self.unparseable += 1,
            FieldStatus::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &FieldStats) {
        self.extracted += other.extracted;
        self.absent += other.absent;
        self.unparseable += other.unparseable;
        self.failed += other.failed;
        self.llm_calls += other.llm_calls;
    }
}

/// One row of output: the document id plus one value per configured field,
/// in field-set order.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub document_id: String,
    pub fields: Vec<(String, FieldValue)>,
    pub stats: FieldStats,
}

impl ExtractionResult {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Replies received for one document, keyed by `(model, prompt)`. `None`
/// records a failed call so it is not retried for a sibling field.
pub type ReplyCache = HashMap<(String, String), Option<String>>;

/// The extraction capability handle. Cheap to clone; shared by document tasks.
#[derive(Clone)]
pub struct Extractor {
    generator: Arc<dyn TextGenerator>,
    default_model: String,
    call_timeout: Duration,
    job_description: Option<Arc<str>>,
}

impl Extractor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        default_model: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            default_model: default_model.into(),
            call_timeout,
            job_description: None,
        }
    }

    pub fn with_job_description(mut self, job_description: Option<String>) -> Self {
        self.job_description = job_description.map(Arc::from);
        self
    }

    fn model_for<'a>(&'a self, spec: &'a FieldSpec) -> &'a str {
        spec.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        match tokio::time::timeout(self.call_timeout, self.generator.generate(model, prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.call_timeout)),
        }
    }

    /// Extracts every field of `fields` from one document.
    ///
    /// Fields whose rendered prompt and model are identical share one call;
    /// each is parsed from the shared reply by its own label.
    pub async fn extract_all(&self, document: &Document, fields: &FieldSet) -> ExtractionResult {
        let mut replies = ReplyCache::new();
        let mut stats = FieldStats::default();
        let mut values = Vec::with_capacity(fields.len());

        for spec in fields.fields() {
            let outcome = self
                .extract(&document.raw_text, spec, &mut replies)
                .await;
            if outcome.status != FieldStatus::Extracted {
                debug!(
                    "{}: field '{}' resolved to sentinel ({:?})",
                    document.id, spec.name, outcome.status
                );
            }
            stats.record(outcome.status);
            values.push((spec.name.clone(), outcome.value));
        }
        stats.llm_calls = replies.len();

        ExtractionResult {
            document_id: document.id.clone(),
            fields: values,
            stats,
        }
    }

    /// Extracts a single field from `document_text`.
    ///
    /// Generates only when `replies` has no answer yet for this model and
    /// prompt; the reply (or the failure) is recorded there for sibling fields.
    pub async fn extract(
        &self,
        document_text: &str,
        spec: &FieldSpec,
        replies: &mut ReplyCache,
    ) -> FieldOutcome {
        let key = (
            self.model_for(spec).to_string(),
            spec.render_prompt(document_text, self.job_description.as_deref()),
        );

        let reply = match replies.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let reply = match self.generate(&key.0, &key.1).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("LLM call for field '{}' failed: {e}", spec.name);
                        None
                    }
                };
                replies.insert(key, reply.clone());
                reply
            }
        };

        match reply {
            Some(text) => resolve(spec, &text),
            None => FieldOutcome::sentinel(spec, FieldStatus::Failed),
        }
    }
}

fn resolve(spec: &FieldSpec, reply: &str) -> FieldOutcome {
    match spec.parse_reply(reply) {
        ParsedReply::Value(value) => FieldOutcome {
            value,
            status: FieldStatus::Extracted,
        },
        ParsedReply::Absent => FieldOutcome::sentinel(spec, FieldStatus::Absent),
        ParsedReply::Unparseable(raw) => {
            debug!("Field '{}' value '{raw}' is not parseable", spec.name);
            FieldOutcome::sentinel(spec, FieldStatus::Unparseable)
        }
    }
}
