//! Reply parsing: turns a raw LLM reply into a field value.
//!
//! Contract: the reply is scanned line by line for `<Label>:`; the remainder of
//! that line, trimmed, is the value. Missing labels, empty values, echoed
//! placeholders and explicit negatives ("None", "N/A", "Not mentioned") are
//! `Absent`. The caller maps `Absent`/`Unparseable` to the field's sentinel.

use std::num::IntErrorKind;
use std::sync::LazyLock;

use regex::Regex;

use super::FieldValue;

/// Replies that mean "the resume does not say".
const NEGATIVE_VALUES: &[&str] = &[
    "none",
    "n/a",
    "na",
    "null",
    "nil",
    "unknown",
    "not mentioned",
    "not available",
    "not provided",
    "not specified",
    "not found",
];

/// Phrases that mark a free-form assessment as a negative answer.
const NEGATIVE_PHRASES: &[&str] = &["not mentioned", "does not have"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Value(FieldValue),
    /// Label missing, or present with no usable value.
    Absent,
    /// Label present but its value could not be interpreted (numeric fields).
    Unparseable(String),
}

/// Finds the first line carrying `<label>:` with a non-empty value.
///
/// Matching is ASCII case-insensitive and anchored at a word boundary, so
/// `Name` matches `- Name:` and `**Full Name:**` but not `Filename:`.
/// Emphasis markers around the label and around the whole value are dropped;
/// asterisks inside the value are kept. Returns the line index and the value.
fn locate_label(reply: &str, label: &str) -> Option<(usize, String)> {
    let needle = label.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }

    for (idx, line) in reply.lines().enumerate() {
        // ASCII lowering keeps byte offsets aligned with `line`.
        let lowered = line.to_ascii_lowercase();

        for (pos, _) in lowered.match_indices(&needle) {
            let at_boundary = lowered[..pos]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            if !at_boundary {
                continue;
            }
            let after_label = line[pos + needle.len()..].trim_start_matches('*');
            let Some(rest) = after_label.strip_prefix(':') else {
                continue;
            };
            let value = if lowered[..pos].ends_with('*') {
                // `**Label:** value` or a fully bold line.
                let v = rest.trim().trim_start_matches('*');
                v.strip_suffix("**").unwrap_or(v).trim()
            } else {
                strip_emphasis(rest.trim())
            };
            if !value.is_empty() {
                return Some((idx, value.to_string()));
            }
        }
    }
    None
}

/// Drops balanced `**…**` or `*…*` around a whole value.
fn strip_emphasis(value: &str) -> &str {
    for marker in ["**", "*"] {
        if value.len() > 2 * marker.len() && value.starts_with(marker) && value.ends_with(marker) {
            return value[marker.len()..value.len() - marker.len()].trim();
        }
    }
    value
}

/// Raw label lookup, without negative/placeholder filtering.
pub fn find_labeled_value(reply: &str, label: &str) -> Option<String> {
    locate_label(reply, label).map(|(_, value)| value)
}

/// `text` fields: single-line labelled value.
pub fn parse_text(reply: &str, label: &str) -> ParsedReply {
    match find_labeled_value(reply, label).and_then(|v| clean_value(&v)) {
        Some(value) => ParsedReply::Value(FieldValue::Text(value)),
        None => ParsedReply::Absent,
    }
}

/// `score` fields: labelled integer clamped into `[1, 100]`.
///
/// Accepts `42`, `42/100` and `42%`.
pub fn parse_score(reply: &str, label: &str) -> ParsedReply {
    let Some(raw) = find_labeled_value(reply, label).and_then(|v| clean_value(&v)) else {
        return ParsedReply::Absent;
    };

    let candidate = raw
        .trim_end_matches('.')
        .trim_end_matches("/100")
        .trim_end_matches('%')
        .trim();

    match candidate.parse::<i64>() {
        Ok(n) => ParsedReply::Value(FieldValue::Score(n.clamp(1, 100) as u8)),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => ParsedReply::Value(FieldValue::Score(100)),
            IntErrorKind::NegOverflow => ParsedReply::Value(FieldValue::Score(1)),
            _ => ParsedReply::Unparseable(raw),
        },
    }
}

/// `freeform` fields: everything after the label to the end of the reply.
pub fn parse_freeform(reply: &str, label: &str) -> ParsedReply {
    let Some((line_idx, first)) = locate_label(reply, label) else {
        return ParsedReply::Absent;
    };

    let mut value = first;
    for line in reply.lines().skip(line_idx + 1) {
        value.push('\n');
        value.push_str(line);
    }
    let value = value.trim().to_string();

    let lowered = value.to_lowercase();
    if NEGATIVE_PHRASES.iter().any(|p| lowered.contains(p)) {
        return ParsedReply::Absent;
    }
    match clean_value(&value) {
        Some(v) => ParsedReply::Value(FieldValue::Text(v)),
        None => ParsedReply::Absent,
    }
}

/// Strips quotes and rejects placeholder echoes and explicit negatives.
fn clean_value(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('"').trim();
    if value.is_empty() {
        return None;
    }

    let is_placeholder = (value.starts_with('[') && value.ends_with(']'))
        || (value.starts_with('<') && value.ends_with('>'));
    if is_placeholder {
        return None;
    }

    let lowered = value.trim_end_matches('.').trim().to_lowercase();
    if NEGATIVE_VALUES.contains(&lowered.as_str()) || lowered.starts_with("not mentioned") {
        return None;
    }

    Some(value.to_string())
}

static GLUED_WORDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"([a-z])([A-Z])",
        r"(\d)([A-Z])",
        r"([A-Z])([A-Z][a-z])",
        r"(\d)([a-zA-Z])",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex must compile"))
    .collect()
});

/// Splits words that PDF text extraction glued together:
/// `JaneDoe` → `Jane Doe`, `NYCNew` → `NYC New`, `5Years` → `5 Years`.
pub fn split_glued_words(value: &str) -> String {
    GLUED_WORDS
        .iter()
        .fold(value.to_string(), |acc, re| re.replace_all(&acc, "$1 $2").into_owned())
}
