//! Findings produced by checkers and the fixes attached to them.

use crate::model::{ProgramUnit, TextRange};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Line used for findings that have no usable source position. The disable
/// filter drops these.
pub const NO_LINE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Info = 3,
}

impl Severity {
    pub const MAX_ORDINAL: u8 = 3;

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Maps an ordinal onto a severity, clamping into `1..=MAX_ORDINAL`.
    pub fn from_ordinal(ordinal: i64) -> Self {
        match ordinal.clamp(1, Self::MAX_ORDINAL as i64) {
            1 => Severity::Error,
            2 => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn github_level(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "notice",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A configured severity, written either as an ordinal or as a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SeverityOverride(pub Severity);

impl<'de> Deserialize<'de> for SeverityOverride {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Ordinal(i64),
            Name(Severity),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Ordinal(n) => SeverityOverride(Severity::from_ordinal(n)),
            Raw::Name(severity) => SeverityOverride(severity),
        })
    }
}

/// One finding. Immutable once built; the pipeline only filters or moves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Defect {
    pub rule_id: String,
    pub file_path: PathBuf,
    pub severity: Severity,
    /// 1-based; negative for findings without a source position.
    pub start_line: i64,
    pub start_column: usize,
    pub end_column: usize,
    pub description: String,
    pub fixable: bool,
    pub fix_key: Option<String>,
    pub doc_path: String,
}

impl Defect {
    pub fn has_position(&self) -> bool {
        self.start_line >= 1
    }

    pub fn display(&self) -> String {
        use colored::*;

        let severity_str = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".cyan().bold(),
        };

        format!(
            "  {}:{} {} [{}] {}",
            self.start_line,
            self.start_column,
            severity_str,
            self.rule_id.dimmed(),
            self.description
        )
    }
}

/// A defect plus the fix its checker proposed for it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    #[serde(flatten)]
    pub defect: Defect,
    #[serde(serialize_with = "serialize_fix_kind")]
    pub fix: Option<Fix>,
}

impl IssueReport {
    pub fn new(defect: Defect) -> Self {
        Self { defect, fix: None }
    }

    pub fn with_fix(defect: Defect, fix: Fix) -> Self {
        Self { defect, fix: Some(fix) }
    }

    pub fn rule_id(&self) -> &str {
        &self.defect.rule_id
    }

    pub fn line(&self) -> i64 {
        self.defect.start_line
    }
}

fn serialize_fix_kind<S: serde::Serializer>(fix: &Option<Fix>, serializer: S) -> Result<S::Ok, S::Error> {
    match fix {
        Some(fix) => serializer.serialize_some(fix.kind()),
        None => serializer.serialize_none(),
    }
}

/// How an issue can be remediated.
#[derive(Debug, Clone)]
pub enum Fix {
    TextPatch(TextPatch),
    UnitFix(UnitFix),
    ExternalSuggestion(SuggestionRequest),
}

impl Fix {
    pub fn kind(&self) -> &'static str {
        match self {
            Fix::TextPatch(_) => "text-patch",
            Fix::UnitFix(_) => "unit-fix",
            Fix::ExternalSuggestion(_) => "external-suggestion",
        }
    }
}

/// Localised text replacements against the unit source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPatch {
    pub description: String,
    pub edits: Vec<PatchEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchEdit {
    pub range: TextRange,
    /// Text the range held when the patch was made.
    pub anchor: String,
    pub replacement: String,
}

impl TextPatch {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            edits: Vec::new(),
        }
    }

    /// Adds a replacement anchored on the text currently at `range`.
    pub fn replace(mut self, source: &str, range: TextRange, replacement: impl Into<String>) -> Self {
        let anchor = source.get(range.start..range.end).unwrap_or("").to_string();
        self.edits.push(PatchEdit {
            range,
            anchor,
            replacement: replacement.into(),
        });
        self
    }
}

pub type UnitMutator = dyn Fn(&mut ProgramUnit, &str) -> bool + Send + Sync;

/// Mutates the in-memory unit; the engine then prints the whole unit.
#[derive(Clone)]
pub struct UnitFix {
    pub description: String,
    mutate: Arc<UnitMutator>,
    /// Set by the fix engine once this fix has produced an artifact.
    pub fixed: bool,
}

impl UnitFix {
    pub fn new<F>(description: impl Into<String>, mutate: F) -> Self
    where
        F: Fn(&mut ProgramUnit, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            mutate: Arc::new(mutate),
            fixed: false,
        }
    }

    pub fn fix(&self, unit: &mut ProgramUnit, fix_key: &str) -> bool {
        (self.mutate)(unit, fix_key)
    }
}

impl fmt::Debug for UnitFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitFix")
            .field("description", &self.description)
            .field("fixed", &self.fixed)
            .finish_non_exhaustive()
    }
}

/// What the checker wants the external generator to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionRequest {
    pub hint: String,
}

impl SuggestionRequest {
    pub fn new(hint: impl Into<String>) -> Self {
        Self { hint: hint.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        severity: SeverityOverride,
    }

    #[test]
    fn test_severity_override_accepts_names_and_ordinals() {
        let named: Holder = toml::from_str("severity = \"warning\"").unwrap();
        assert_eq!(named.severity.0, Severity::Warning);

        let ordinal: Holder = toml::from_str("severity = 1").unwrap();
        assert_eq!(ordinal.severity.0, Severity::Error);

        let clamped: Holder = toml::from_str("severity = 42").unwrap();
        assert_eq!(clamped.severity.0, Severity::Info);

        let low: Holder = toml::from_str("severity = -3").unwrap();
        assert_eq!(low.severity.0, Severity::Error);
    }

    #[test]
    fn test_text_patch_records_anchor() {
        let source = "let h = md5(data);";
        let patch = TextPatch::new("use sha256").replace(source, TextRange::new(8, 11), "sha256");
        assert_eq!(patch.edits[0].anchor, "md5");
    }

    #[test]
    fn test_issue_report_serializes_fix_kind() {
        let defect = Defect {
            rule_id: "weak-crypto".to_string(),
            file_path: PathBuf::from("a.rs"),
            severity: Severity::Error,
            start_line: 3,
            start_column: 9,
            end_column: 12,
            description: "MD5 is broken".to_string(),
            fixable: true,
            fix_key: None,
            doc_path: "docs/rules/weak-crypto.md".to_string(),
        };
        let report = IssueReport::with_fix(defect, Fix::ExternalSuggestion(SuggestionRequest::new("x")));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rule_id"], "weak-crypto");
        assert_eq!(json["fix"], "external-suggestion");
    }
}
