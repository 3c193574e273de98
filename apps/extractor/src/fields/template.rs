//! Prompt template rendering.
//!
//! Templates reference `{resume_text}`, `{job_description}` and `{skill}`.
//! Substitution is single-pass: text inserted for one placeholder is never
//! scanned again, and unknown `{...}` sequences (JSON examples, for instance)
//! are left untouched.

pub const RESUME_TEXT: &str = "resume_text";
pub const JOB_DESCRIPTION: &str = "job_description";
pub const SKILL: &str = "skill";

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptVars<'a> {
    pub resume_text: &'a str,
    pub job_description: Option<&'a str>,
    pub skill: Option<&'a str>,
}

impl<'a> PromptVars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            RESUME_TEXT => Some(self.resume_text),
            JOB_DESCRIPTION => self.job_description,
            SKILL => self.skill,
            _ => None,
        }
    }
}

pub fn render(template: &str, vars: &PromptVars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + vars.resume_text.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => match vars.lookup(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// True when `template` contains the `{name}` placeholder.
pub fn references(template: &str, name: &str) -> bool {
    template.contains(&format!("{{{name}}}"))
}
