//! Field specifications: what to extract, how to ask for it, how to read the reply.
//!
//! A `FieldSet` is static configuration: built once (from `fields.toml` or the
//! built-in defaults), validated, then shared read-only by every document task.
//! Its order defines the column order of the sink.

pub mod parser;
pub mod prompts;
pub mod template;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::fields::parser::{parse_freeform, parse_score, parse_text, split_glued_words, ParsedReply};
use crate::fields::prompts::{
    EXPERIENCE_PROMPT, FITMENT_PROMPT, IDENTITY_PROMPT, PHONE_PROMPT, SCORE_PROMPT,
    SKILL_FIT_PROMPT,
};
use crate::fields::template::{PromptVars, JOB_DESCRIPTION, RESUME_TEXT, SKILL};

/// Reserved key column of the sink.
pub const FILENAME_COLUMN: &str = "Filename";
/// Default sentinel for `text` and `freeform` fields.
pub const NOT_MENTIONED: &str = "Not mentioned";
/// Sentinel for the built-in experience field.
pub const NO_EXPERIENCE: &str = "Fresher or Not mentioned";
/// Sentinel for `score` fields.
pub const SCORE_SENTINEL: u8 = 0;

const DEFAULT_SKILL_LABEL: &str = "Assessment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Single-line labelled value.
    #[default]
    Text,
    /// Labelled integer, clamped into [1, 100].
    Score,
    /// Labelled value running to the end of the reply.
    Freeform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Score(u8),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Score(n) => write!(f, "{n}"),
        }
    }
}

fn default_sentinel(kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Text | FieldKind::Freeform => FieldValue::Text(NOT_MENTIONED.to_string()),
        FieldKind::Score => FieldValue::Score(SCORE_SENTINEL),
    }
}

/// One extraction target.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Column name in the sink.
    pub name: String,
    /// Label the reply is scanned for (`<label>:`).
    pub label: String,
    pub prompt_template: String,
    pub kind: FieldKind,
    pub sentinel: FieldValue,
    /// Split glued words in the extracted value.
    pub normalize: bool,
    /// Per-field model override.
    pub model: Option<String>,
    /// Value of `{skill}` for skill-fit fields.
    pub skill: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind, prompt_template: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            prompt_template: prompt_template.to_string(),
            kind,
            sentinel: default_sentinel(kind),
            normalize: false,
            model: None,
            skill: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_text_sentinel(mut self, sentinel: &str) -> Self {
        self.sentinel = FieldValue::Text(sentinel.to_string());
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn requires_job_description(&self) -> bool {
        template::references(&self.prompt_template, JOB_DESCRIPTION)
    }

    pub fn render_prompt(&self, resume_text: &str, job_description: Option<&str>) -> String {
        template::render(
            &self.prompt_template,
            &PromptVars {
                resume_text,
                job_description,
                skill: self.skill.as_deref(),
            },
        )
    }

    /// Parses a reply by this field's kind, then applies normalization.
    pub fn parse_reply(&self, reply: &str) -> ParsedReply {
        let parsed = match self.kind {
            FieldKind::Text => parse_text(reply, &self.label),
            FieldKind::Score => parse_score(reply, &self.label),
            FieldKind::Freeform => parse_freeform(reply, &self.label),
        };
        match parsed {
            ParsedReply::Value(FieldValue::Text(v)) if self.normalize => {
                ParsedReply::Value(FieldValue::Text(split_glued_words(&v)))
            }
            other => other,
        }
    }
}

/// The validated, ordered list of fields for a run.
#[derive(Debug, Clone)]
pub struct FieldSet {
    fields: Vec<FieldSpec>,
    model: Option<String>,
}

impl FieldSet {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, AppError> {
        validate(&fields)?;
        Ok(Self {
            fields,
            model: None,
        })
    }

    /// Built-in defaults: identity, phone and experience, plus fitment summary
    /// and suitability score when a job description is available.
    pub fn builtin(with_job_description: bool) -> Self {
        let mut fields = vec![
            FieldSpec::new("Name", FieldKind::Text, IDENTITY_PROMPT).normalized(),
            FieldSpec::new("Location", FieldKind::Text, IDENTITY_PROMPT).normalized(),
            FieldSpec::new("Phone Number", FieldKind::Text, PHONE_PROMPT).normalized(),
            FieldSpec::new("Total Experience", FieldKind::Text, EXPERIENCE_PROMPT)
                .with_label("Experience")
                .with_text_sentinel(NO_EXPERIENCE),
        ];
        if with_job_description {
            fields.push(
                FieldSpec::new("Fitment Summary", FieldKind::Text, FITMENT_PROMPT)
                    .with_label("Summary"),
            );
            fields.push(
                FieldSpec::new("Suitability Score", FieldKind::Score, SCORE_PROMPT)
                    .with_label("Score"),
            );
        }
        Self {
            fields,
            model: None,
        }
    }

    /// Appends one built-in skill-fit column per skill.
    pub fn with_skills(mut self, skills: &[String]) -> Result<Self, AppError> {
        let extra = skill_fit_fields(SKILL_FIT_PROMPT, skills, DEFAULT_SKILL_LABEL, None, None);
        if extra.is_empty() {
            return Ok(self);
        }
        self.fields.extend(extra);
        validate(&self.fields)?;
        Ok(self)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read field file {}: {e}", path.display()))
        })?;
        let set = Self::from_toml_str(&raw)?;
        debug!(
            "Loaded {} field specs from {}",
            set.fields.len(),
            path.display()
        );
        Ok(set)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let file: FieldFile =
            toml::from_str(raw).map_err(|e| AppError::Config(format!("invalid TOML: {e}")))?;
        file.into_field_set()
    }

    /// Fails when a template needs `{job_description}` but none was supplied.
    pub fn ensure_job_description(&self, available: bool) -> Result<(), AppError> {
        if available {
            return Ok(());
        }
        let needing: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.requires_job_description())
            .map(|f| f.name.as_str())
            .collect();
        if needing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(format!(
                "fields [{}] use {{{JOB_DESCRIPTION}}} but no job description was given",
                needing.join(", ")
            )))
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Default model named by the field file, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

fn validate(fields: &[FieldSpec]) -> Result<(), AppError> {
    if fields.is_empty() {
        return Err(AppError::Config("at least one field is required".into()));
    }

    let mut seen = HashSet::new();
    for field in fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(AppError::Config("field names must not be empty".into()));
        }
        if name.eq_ignore_ascii_case(FILENAME_COLUMN) {
            return Err(AppError::Config(format!(
                "'{FILENAME_COLUMN}' is reserved for the key column"
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(AppError::Config(format!("duplicate field name '{name}'")));
        }
        if field.label.trim().is_empty() {
            return Err(AppError::Config(format!("field '{name}' has an empty label")));
        }
        if !template::references(&field.prompt_template, RESUME_TEXT) {
            return Err(AppError::Config(format!(
                "prompt for '{name}' must contain {{{RESUME_TEXT}}}"
            )));
        }
        if template::references(&field.prompt_template, SKILL) && field.skill.is_none() {
            return Err(AppError::Config(format!(
                "prompt for '{name}' uses {{{SKILL}}}; only [skill_fit] prompts may"
            )));
        }
    }
    Ok(())
}

/// One `freeform` field per non-empty skill, named after the skill.
fn skill_fit_fields(
    prompt: &str,
    skills: &[String],
    label: &str,
    sentinel: Option<&str>,
    model: Option<&str>,
) -> Vec<FieldSpec> {
    skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|skill| {
            let mut spec = FieldSpec::new(skill, FieldKind::Freeform, prompt).with_label(label);
            if let Some(sentinel) = sentinel {
                spec.sentinel = FieldValue::Text(sentinel.to_string());
            }
            spec.model = model.map(str::to_string);
            spec.skill = Some(skill.to_string());
            spec
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// TOML field file
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldFile {
    #[serde(default)]
    model: Option<String>,
    #[serde(default, rename = "field")]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    skill_fit: Option<SkillFitEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    kind: FieldKind,
    prompt: String,
    #[serde(default)]
    sentinel: Option<String>,
    #[serde(default)]
    normalize: bool,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SkillFitEntry {
    prompt: String,
    skills: Vec<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    sentinel: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl FieldFile {
    fn into_field_set(self) -> Result<FieldSet, AppError> {
        let mut fields = Vec::with_capacity(self.fields.len());

        for entry in self.fields {
            let name = entry.name.trim().to_string();
            let mut spec = FieldSpec::new(&name, entry.kind, &entry.prompt);
            if let Some(label) = entry.label {
                spec.label = label.trim().to_string();
            }
            if let Some(sentinel) = entry.sentinel {
                if entry.kind == FieldKind::Score {
                    return Err(AppError::Config(format!(
                        "score field '{name}' cannot override its sentinel ({SCORE_SENTINEL})"
                    )));
                }
                spec.sentinel = FieldValue::Text(sentinel);
            }
            spec.normalize = entry.normalize;
            spec.model = entry.model;
            fields.push(spec);
        }

        if let Some(skill_fit) = self.skill_fit {
            fields.extend(skill_fit_fields(
                &skill_fit.prompt,
                &skill_fit.skills,
                skill_fit.label.as_deref().unwrap_or(DEFAULT_SKILL_LABEL),
                skill_fit.sentinel.as_deref(),
                skill_fit.model.as_deref(),
            ));
        }

        let mut set = FieldSet::new(fields)?;
        set.model = self.model.filter(|m| !m.trim().is_empty());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_without_job_description_skips_job_fields() {
        let set = FieldSet::builtin(false);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, ["Name", "Location", "Phone Number", "Total Experience"]);
        assert!(set.ensure_job_description(false).is_ok());
        validate(set.fields()).unwrap();
    }

    #[test]
    fn test_builtin_with_job_description_adds_score() {
        let set = FieldSet::builtin(true);
        assert_eq!(set.len(), 6);
        let score = set.fields().last().unwrap();
        assert_eq!(score.kind, FieldKind::Score);
        assert_eq!(score.sentinel, FieldValue::Score(0));
        assert!(set.ensure_job_description(false).is_err());
        validate(set.fields()).unwrap();
    }

    #[test]
    fn test_builtin_experience_uses_fresher_sentinel() {
        let set = FieldSet::builtin(false);
        let exp = &set.fields()[3];
        assert_eq!(exp.label, "Experience");
        assert_eq!(exp.sentinel, FieldValue::Text(NO_EXPERIENCE.into()));
    }

    #[test]
    fn test_with_skills_appends_skill_fit_columns() {
        let set = FieldSet::builtin(false)
            .with_skills(&[" Rust ".to_string(), String::new(), "Kubernetes".to_string()])
            .unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(
            names,
            ["Name", "Location", "Phone Number", "Total Experience", "Rust", "Kubernetes"]
        );
        let rust = &set.fields()[4];
        assert_eq!(rust.kind, FieldKind::Freeform);
        assert_eq!(rust.label, "Assessment");
        assert!(rust.render_prompt("cv", None).contains("skill 'Rust'"));
    }

    #[test]
    fn test_with_skills_rejects_clash_with_existing_field() {
        let err = FieldSet::builtin(false)
            .with_skills(&["name".to_string()])
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_shipped_field_file_parses() {
        let set = FieldSet::from_toml_str(include_str!("../../fields.toml")).unwrap();
        assert!(set.names().any(|n| n == "Name"));
        assert!(set.names().any(|n| n == "Suitability Score"));
        assert!(set.fields().iter().any(|f| f.skill.is_some()));
        assert_eq!(set.model(), Some("llama3:latest"));
    }

    #[test]
    fn test_toml_entry_defaults() {
        let set = FieldSet::from_toml_str(
            r#"
            [[field]]
            name = "Email"
            prompt = "Find the email. {resume_text}"
            "#,
        )
        .unwrap();
        let email = &set.fields()[0];
        assert_eq!(email.label, "Email");
        assert_eq!(email.kind, FieldKind::Text);
        assert_eq!(email.sentinel, FieldValue::Text(NOT_MENTIONED.into()));
        assert!(!email.normalize);
        assert!(set.model().is_none());
    }

    #[test]
    fn test_skill_fit_expands_one_field_per_skill() {
        let set = FieldSet::from_toml_str(
            r#"
            [skill_fit]
            prompt = "Skill {skill}? {resume_text}"
            skills = ["Rust", "  ", "Kubernetes"]
            "#,
        )
        .unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, ["Rust", "Kubernetes"]);
        let rust = &set.fields()[0];
        assert_eq!(rust.kind, FieldKind::Freeform);
        assert_eq!(rust.label, DEFAULT_SKILL_LABEL);
        assert_eq!(rust.render_prompt("CV", None), "Skill Rust? CV");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = FieldSet::from_toml_str(
            r#"
            [[field]]
            name = "Name"
            prompt = "{resume_text}"
            [[field]]
            name = "name"
            prompt = "{resume_text}"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_filename_is_reserved() {
        let spec = FieldSpec::new("Filename", FieldKind::Text, "{resume_text}");
        assert!(FieldSet::new(vec![spec]).is_err());
    }

    #[test]
    fn test_prompt_must_include_resume_text() {
        let spec = FieldSpec::new("Name", FieldKind::Text, "What is the name?");
        let err = FieldSet::new(vec![spec]).unwrap_err();
        assert!(err.to_string().contains("resume_text"));
    }

    #[test]
    fn test_score_sentinel_override_rejected() {
        let err = FieldSet::from_toml_str(
            r#"
            [[field]]
            name = "Score"
            kind = "score"
            sentinel = "n/a"
            prompt = "{resume_text}"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(FieldSet::from_toml_str(
            r#"
            [[field]]
            name = "Name"
            promt = "{resume_text}"
            "#,
        )
        .is_err());
    }

    #[test]
    fn test_normalized_field_splits_glued_words() {
        let spec = FieldSpec::new("Name", FieldKind::Text, "{resume_text}").normalized();
        assert_eq!(
            spec.parse_reply("- Name: JaneDoe"),
            ParsedReply::Value(FieldValue::Text("Jane Doe".into()))
        );
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Score(42).to_string(), "42");
        assert_eq!(FieldValue::Text("Austin, TX".into()).to_string(), "Austin, TX");
    }
}
