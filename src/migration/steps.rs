//! Step script assembly
//!
//! Steps are written one per line in the script format of the workspace:
//!
//! ```text
//! - open the login page\n
//! - ?the login form is shown\n
//! - @1042\n
//! ```
//!
//! where `?` marks a validation step and `@` calls another test by remote id.
//! The trailing `\n` is the literal two-character escape, since the whole
//! script travels inside a JSON string.

use std::collections::HashMap;
use std::fmt;

/// Literal line terminator inside the script
const LINE_END: &str = "\\n";

/// Kind of a step row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Simple,
    Validation,
    /// Calls a previously migrated test
    Call,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Simple => "simple",
            StepKind::Validation => "validation",
            StepKind::Call => "call",
        }
    }

    pub fn all() -> &'static [StepKind] {
        &[StepKind::Simple, StepKind::Validation, StepKind::Call]
    }

    /// Parse a `step_type` cell, ignoring case
    pub fn parse(text: &str) -> Option<StepKind> {
        let text = text.trim();
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(text))
    }

    fn prefix(&self) -> &'static str {
        match self {
            StepKind::Simple => "- ",
            StepKind::Validation => "- ?",
            StepKind::Call => "- @",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escape step text for the script
///
/// Leading and trailing tabs and newlines are stripped and every run of line
/// breaks becomes one literal `\n`. Quotes, backslashes, tabs and other
/// control characters are escaped so the text can sit in a JSON string.
pub fn escape_step_text(text: &str) -> String {
    let stripped = text.trim_matches(|c: char| c == '\t' || c == '\n' || c == '\r');

    let mut out = String::with_capacity(stripped.len());
    let mut in_break = false;
    for c in stripped.chars() {
        match c {
            '\r' | '\n' => {
                if !in_break {
                    out.push_str(LINE_END);
                    in_break = true;
                }
                continue;
            }
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            other => out.push(other),
        }
        in_break = false;
    }
    out
}

/// Result of appending one step row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Appended,
    /// `step_type` is missing or not a known kind
    UnknownKind(Option<String>),
    /// Call target was not migrated before this step
    UnresolvedCall(String),
    /// Simple or validation step without text, or call without target
    Blank(StepKind),
}

impl StepOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, StepOutcome::Appended)
    }
}

/// Ordered step lines of one test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepScript {
    lines: Vec<String>,
}

impl StepScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and append one step
    ///
    /// Call steps resolve their target unique id through `migrated`, which
    /// only holds tests created earlier in the run.
    pub fn push(
        &mut self,
        step_type: Option<&str>,
        text: Option<&str>,
        migrated: &HashMap<String, String>,
    ) -> StepOutcome {
        let Some(kind) = step_type.and_then(StepKind::parse) else {
            return StepOutcome::UnknownKind(step_type.map(String::from));
        };

        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return StepOutcome::Blank(kind);
        };

        let body = match kind {
            StepKind::Call => {
                let target = text.trim();
                match migrated.get(target) {
                    Some(remote_id) => remote_id.clone(),
                    None => return StepOutcome::UnresolvedCall(target.to_string()),
                }
            }
            StepKind::Simple | StepKind::Validation => escape_step_text(text),
        };

        self.lines
            .push(format!("{}{}{}", kind.prefix(), body, LINE_END));
        StepOutcome::Appended
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The concatenated script text
    pub fn script(&self) -> String {
        self.lines.concat()
    }

    /// Request body of the script upload
    pub fn body(&self) -> String {
        script_body(&self.script())
    }
}

/// Wrap an already escaped script into the upload request body
pub fn script_body(script: &str) -> String {
    format!(
        r#"{{"script":"{}","comment":"","revision_type":"Minor"}}"#,
        script
    )
}
