//! Fix engine: one remediation mode per run, at most one artifact per unit.
//!
//! Issues are tried in dispatch order. The first fix that succeeds produces
//! `<output_dir>/<unit output name>` and every issue after it is left for a
//! later run. Issues whose fix is missing, of another mode, or not marked
//! fixable are passed through untouched.

mod suggestion;
mod text_patch;
mod unit_fix;

pub use suggestion::{ExternalSuggestionStrategy, SuggestionBackend, SuggestionInput, UnavailableBackend};
pub use text_patch::{apply_patch, TextPatchStrategy};
pub use unit_fix::UnitFixStrategy;

use crate::config::AutofixConfig;
use crate::defect::{Fix, IssueReport};
use crate::error::{ConfigError, Error, FixError};
use crate::model::ProgramUnit;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixMode {
    TextPatch,
    UnitFix,
    ExternalSuggestion,
}

impl FixMode {
    pub const ALL: [FixMode; 3] = [FixMode::TextPatch, FixMode::UnitFix, FixMode::ExternalSuggestion];

    pub fn as_str(self) -> &'static str {
        match self {
            FixMode::TextPatch => "text-patch",
            FixMode::UnitFix => "unit-fix",
            FixMode::ExternalSuggestion => "external-suggestion",
        }
    }

    pub fn handles(self, fix: &Fix) -> bool {
        matches!(
            (self, fix),
            (FixMode::TextPatch, Fix::TextPatch(_))
                | (FixMode::UnitFix, Fix::UnitFix(_))
                | (FixMode::ExternalSuggestion, Fix::ExternalSuggestion(_))
        )
    }
}

impl FromStr for FixMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FixMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedMode(s.to_string()))
    }
}

impl fmt::Display for FixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful attempt produced.
#[derive(Debug)]
pub struct Attempt {
    pub text: String,
    /// Mutated copy of the unit, kept only once `text` is on disk.
    pub unit: Option<ProgramUnit>,
}

impl Attempt {
    pub fn text(text: String) -> Self {
        Self { text, unit: None }
    }

    pub fn with_unit(text: String, unit: ProgramUnit) -> Self {
        Self { text, unit: Some(unit) }
    }
}

/// One remediation mode.
pub trait FixStrategy: Send + Sync {
    fn mode(&self) -> FixMode;

    /// Produces the corrected text of `unit` for `issue`. The live unit is
    /// never touched here.
    fn attempt(&self, unit: &ProgramUnit, issue: &IssueReport) -> Result<Attempt, FixError>;
}

#[derive(Debug, Default)]
pub struct FixOutcome {
    /// Every issue that was not fixed, in dispatch order.
    pub remaining: Vec<IssueReport>,
    /// The artifact written for this unit, if any fix succeeded.
    pub output_path: Option<PathBuf>,
    pub applied: Option<IssueReport>,
}

impl FixOutcome {
    pub fn unchanged(issues: Vec<IssueReport>) -> Self {
        Self {
            remaining: issues,
            output_path: None,
            applied: None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.output_path.is_some()
    }
}

/// Written into every output directory checkfix creates.
pub const WORKSPACE_MARKER: &str = ".checkfix-output";

/// Directory that receives the corrected artifacts of a run.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes artifacts of earlier runs and recreates the directory.
    ///
    /// A directory that holds `analysis_root`, or one with contents checkfix
    /// did not create, is never cleared.
    pub fn prepare(&self, analysis_root: &Path) -> Result<(), Error> {
        if self.root.exists() {
            self.check_clearable(analysis_root)?;
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(WORKSPACE_MARKER), "")?;
        Ok(())
    }

    fn check_clearable(&self, analysis_root: &Path) -> Result<(), ConfigError> {
        let refuse = |reason: String| ConfigError::UnsafeOutputDir {
            path: self.root.clone(),
            reason,
        };
        let workspace = self.root.canonicalize().map_err(|e| refuse(e.to_string()))?;
        let analysed = analysis_root
            .canonicalize()
            .unwrap_or_else(|_| analysis_root.to_path_buf());
        if analysed.starts_with(&workspace) {
            return Err(refuse("it contains the analysed sources".to_string()));
        }
        if !workspace.is_dir() {
            return Err(refuse("it is not a directory".to_string()));
        }
        let mut entries = fs::read_dir(&workspace).map_err(|e| refuse(e.to_string()))?;
        if entries.next().is_some() && !workspace.join(WORKSPACE_MARKER).is_file() {
            return Err(refuse("it was not created by checkfix".to_string()));
        }
        Ok(())
    }

    pub fn artifact_path(&self, unit: &ProgramUnit) -> PathBuf {
        self.root.join(unit.output_name())
    }

    /// Writes through a temporary sibling so a failed write leaves no
    /// partial artifact behind.
    pub fn write(&self, unit: &ProgramUnit, contents: &str) -> Result<PathBuf, FixError> {
        let path = self.artifact_path(unit);
        let tmp = self.root.join(format!(".{}.tmp", unit.output_name()));
        let write_err = |source| FixError::Write {
            path: path.clone(),
            source,
        };

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        Ok(path)
    }
}

pub struct FixEngine {
    strategy: Box<dyn FixStrategy>,
    workspace: Workspace,
}

impl FixEngine {
    /// Fails fast on an unknown mode. The external-suggestion mode uses
    /// [`UnavailableBackend`]; see [`FixEngine::with_backend`].
    pub fn for_mode(mode: &str, config: &AutofixConfig) -> Result<Self, ConfigError> {
        Self::with_backend(mode, config, Arc::new(UnavailableBackend))
    }

    pub fn with_backend(
        mode: &str,
        config: &AutofixConfig,
        backend: Arc<dyn SuggestionBackend>,
    ) -> Result<Self, ConfigError> {
        let strategy: Box<dyn FixStrategy> = match mode.parse::<FixMode>()? {
            FixMode::TextPatch => Box::new(TextPatchStrategy),
            FixMode::UnitFix => Box::new(UnitFixStrategy),
            FixMode::ExternalSuggestion => Box::new(ExternalSuggestionStrategy::new(
                backend,
                Duration::from_millis(config.suggestion_timeout_ms),
            )),
        };
        Ok(Self::new(strategy, Workspace::new(&config.output_dir)))
    }

    pub fn new(strategy: Box<dyn FixStrategy>, workspace: Workspace) -> Self {
        Self { strategy, workspace }
    }

    pub fn mode(&self) -> FixMode {
        self.strategy.mode()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Must finish before any unit of the run is fixed.
    pub fn prepare(&self, analysis_root: &Path) -> Result<(), Error> {
        tracing::debug!("clearing fix workspace {}", self.workspace.root().display());
        self.workspace.prepare(analysis_root)
    }

    fn is_candidate(&self, issue: &IssueReport) -> bool {
        issue.defect.fixable
            && issue
                .fix
                .as_ref()
                .map_or(false, |fix| self.mode().handles(fix))
    }

    pub fn apply_fix(&self, unit: &mut ProgramUnit, issues: Vec<IssueReport>) -> FixOutcome {
        let mut remaining = Vec::with_capacity(issues.len());
        let mut pending = issues.into_iter();

        while let Some(mut issue) = pending.next() {
            if !self.is_candidate(&issue) {
                remaining.push(issue);
                continue;
            }

            let written = self.strategy.attempt(unit, &issue).and_then(|attempt| {
                let path = self.workspace.write(unit, &attempt.text)?;
                Ok((path, attempt.unit))
            });
            match written {
                Ok((path, updated)) => {
                    if let Some(updated) = updated {
                        *unit = updated;
                    }
                    if let Some(Fix::UnitFix(fix)) = issue.fix.as_mut() {
                        fix.fixed = true;
                    }
                    tracing::debug!(
                        "{}: fixed {} at line {} -> {}",
                        unit.name,
                        issue.rule_id(),
                        issue.line(),
                        path.display()
                    );
                    remaining.extend(pending);
                    return FixOutcome {
                        remaining,
                        output_path: Some(path),
                        applied: Some(issue),
                    };
                }
                Err(e) => {
                    tracing::debug!("{}: {} fix not applied: {}", unit.name, issue.rule_id(), e);
                    remaining.push(issue);
                }
            }
        }

        FixOutcome::unchanged(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defect::{Defect, Severity, SuggestionRequest, TextPatch, UnitFix};
    use crate::model::TextRange;
    use crate::rules::test_support::unit_from_lines;
    use tempfile::TempDir;

    fn defect(rule: &str, line: i64, fixable: bool, key: Option<&str>) -> Defect {
        Defect {
            rule_id: rule.to_string(),
            file_path: PathBuf::from("src/app.rs"),
            severity: Severity::Warning,
            start_line: line,
            start_column: 5,
            end_column: 9,
            description: rule.to_string(),
            fixable,
            fix_key: key.map(str::to_string),
            doc_path: String::new(),
        }
    }

    fn remove_statement() -> UnitFix {
        UnitFix::new("remove", |unit, key| match key.parse().ok().and_then(|id| unit.statement_mut(id)) {
            Some(stmt) => {
                stmt.remove();
                true
            }
            None => false,
        })
    }

    fn engine(mode: &str, dir: &TempDir) -> FixEngine {
        let config = AutofixConfig {
            output_dir: dir.path().join("out"),
            ..AutofixConfig::default()
        };
        let engine = FixEngine::for_mode(mode, &config).unwrap();
        engine.prepare(dir.path()).unwrap();
        engine
    }

    fn artifacts(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "fix"))
            .collect()
    }

    const SOURCE: &str = "fn main() {\n    a();\n    b();\n    c();\n}\n";

    #[test]
    fn test_unknown_mode_fails_fast() {
        let err = FixEngine::for_mode("rewrite-everything", &AutofixConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnsupportedMode(mode) if mode == "rewrite-everything"));
        assert_eq!("unit-fix".parse::<FixMode>().unwrap(), FixMode::UnitFix);
    }

    #[test]
    fn test_first_success_wins() {
        let dir = TempDir::new().unwrap();
        let engine = engine("unit-fix", &dir);
        let mut unit = unit_from_lines("src/app.rs", SOURCE);

        let issues = vec![
            IssueReport::new(defect("plain", 2, false, None)),
            IssueReport::with_fix(defect("bad-key", 2, true, Some("99")), Fix::UnitFix(remove_statement())),
            IssueReport::with_fix(defect("good", 3, true, Some("1")), Fix::UnitFix(remove_statement())),
            IssueReport::with_fix(defect("later", 4, true, Some("2")), Fix::UnitFix(remove_statement())),
        ];
        let outcome = engine.apply_fix(&mut unit, issues);

        let path = outcome.output_path.clone().unwrap();
        assert_eq!(path, dir.path().join("out").join("src.app.rs.fix"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "fn main() {\n    a();\n    c();\n}\n");

        let remaining: Vec<_> = outcome.remaining.iter().map(|i| i.rule_id()).collect();
        assert_eq!(remaining, vec!["plain", "bad-key", "later"]);

        let applied = outcome.applied.unwrap();
        assert_eq!(applied.rule_id(), "good");
        assert!(matches!(applied.fix, Some(Fix::UnitFix(ref fix)) if fix.fixed));
        // the later issue is untouched
        assert!(matches!(outcome.remaining[2].fix, Some(Fix::UnitFix(ref fix)) if !fix.fixed));
    }

    #[test]
    fn test_one_artifact_per_unit() {
        let dir = TempDir::new().unwrap();
        let engine = engine("unit-fix", &dir);
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let issues = vec![
            IssueReport::with_fix(defect("r", 2, true, Some("0")), Fix::UnitFix(remove_statement())),
            IssueReport::with_fix(defect("r", 3, true, Some("1")), Fix::UnitFix(remove_statement())),
        ];
        let outcome = engine.apply_fix(&mut unit, issues);

        assert_eq!(outcome.remaining.len(), 1);
        assert_eq!(artifacts(&dir.path().join("out")).len(), 1);
    }

    #[test]
    fn test_mode_mismatch_and_unfixable_pass_through() {
        let dir = TempDir::new().unwrap();
        let engine = engine("text-patch", &dir);
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let patch = TextPatch::new("rename").replace(SOURCE, TextRange::new(16, 17), "z");
        let issues = vec![
            IssueReport::with_fix(defect("unit", 2, true, Some("0")), Fix::UnitFix(remove_statement())),
            IssueReport::with_fix(defect("not-fixable", 2, false, None), Fix::TextPatch(patch)),
            IssueReport::with_fix(
                defect("suggest", 2, true, None),
                Fix::ExternalSuggestion(SuggestionRequest::new("x")),
            ),
        ];
        let outcome = engine.apply_fix(&mut unit, issues);
        assert!(!outcome.is_fixed());
        assert_eq!(outcome.remaining.len(), 3);
        assert!(!unit.has_edits());
    }

    #[test]
    fn test_text_patch_mode_writes_patched_source() {
        let dir = TempDir::new().unwrap();
        let engine = engine("text-patch", &dir);
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let patch = TextPatch::new("rename").replace(SOURCE, TextRange::new(16, 17), "z");
        let outcome = engine.apply_fix(
            &mut unit,
            vec![IssueReport::with_fix(defect("p", 2, true, None), Fix::TextPatch(patch))],
        );
        let contents = fs::read_to_string(outcome.output_path.unwrap()).unwrap();
        assert_eq!(contents, "fn main() {\n    z();\n    b();\n    c();\n}\n");
        assert_eq!(unit.source, SOURCE);
    }

    #[test]
    fn test_unavailable_backend_leaves_issue() {
        let dir = TempDir::new().unwrap();
        let engine = engine("external-suggestion", &dir);
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let outcome = engine.apply_fix(
            &mut unit,
            vec![IssueReport::with_fix(
                defect("secret", 2, true, Some("0")),
                Fix::ExternalSuggestion(SuggestionRequest::new("use env")),
            )],
        );
        assert!(!outcome.is_fixed());
        assert_eq!(outcome.remaining.len(), 1);
        assert!(!engine.workspace().artifact_path(&unit).exists());
    }

    #[test]
    fn test_prepare_clears_previous_run() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path().join("out"));
        workspace.prepare(dir.path()).unwrap();
        fs::write(dir.path().join("out").join("stale.rs.fix"), "old").unwrap();

        workspace.prepare(dir.path()).unwrap();
        let left: Vec<_> = fs::read_dir(workspace.root())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(WORKSPACE_MARKER)]);
    }

    #[test]
    fn test_prepare_refuses_to_clear_sources() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();

        // the analysed tree itself
        let err = Workspace::new(dir.path()).prepare(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnsafeOutputDir { .. })));
        // a sibling directory checkfix did not create
        let err = Workspace::new(dir.path().join("src"))
            .prepare(&dir.path().join("lib.rs"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnsafeOutputDir { .. })));
        assert!(dir.path().join("src/main.rs").exists());

        // an empty directory is fine
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        Workspace::new(dir.path().join("empty")).prepare(dir.path()).unwrap();
        assert!(dir.path().join("empty").join(WORKSPACE_MARKER).exists());
    }

    #[test]
    fn test_overlapping_patch_leaves_issue_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine("text-patch", &dir);
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let patch = TextPatch::new("clash")
            .replace(SOURCE, TextRange::new(16, 19), "x()")
            .replace(SOURCE, TextRange::new(17, 18), "y");
        let outcome = engine.apply_fix(
            &mut unit,
            vec![IssueReport::with_fix(defect("p", 2, true, None), Fix::TextPatch(patch))],
        );
        assert!(!outcome.is_fixed());
        assert!(outcome.applied.is_none());
        assert_eq!(outcome.remaining.len(), 1);
        assert!(artifacts(&dir.path().join("out")).is_empty());
        assert_eq!(unit.source, SOURCE);
    }

    #[test]
    fn test_failed_write_keeps_unit_unchanged() {
        let dir = TempDir::new().unwrap();
        let config = AutofixConfig {
            output_dir: dir.path().join("never-created"),
            ..AutofixConfig::default()
        };
        let engine = FixEngine::for_mode("unit-fix", &config).unwrap();
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let issues = vec![
            IssueReport::with_fix(defect("first", 2, true, Some("0")), Fix::UnitFix(remove_statement())),
            IssueReport::with_fix(defect("second", 3, true, Some("1")), Fix::UnitFix(remove_statement())),
        ];
        let outcome = engine.apply_fix(&mut unit, issues);

        assert!(!outcome.is_fixed());
        assert_eq!(outcome.remaining.len(), 2);
        assert!(!unit.has_edits());
        assert!(outcome
            .remaining
            .iter()
            .all(|issue| matches!(issue.fix, Some(Fix::UnitFix(ref fix)) if !fix.fixed)));
    }

    struct Stalls;

    #[async_trait::async_trait]
    impl SuggestionBackend for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }

        async fn suggest(&self, _input: SuggestionInput) -> Result<String, crate::error::SuggestionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    #[test]
    fn test_suggestion_timeout_leaves_issue() {
        let dir = TempDir::new().unwrap();
        let config = AutofixConfig {
            output_dir: dir.path().join("out"),
            suggestion_timeout_ms: 20,
            ..AutofixConfig::default()
        };
        let engine = FixEngine::with_backend("external-suggestion", &config, Arc::new(Stalls)).unwrap();
        engine.prepare(dir.path()).unwrap();
        let mut unit = unit_from_lines("app.rs", SOURCE);
        let outcome = engine.apply_fix(
            &mut unit,
            vec![IssueReport::with_fix(
                defect("secret", 2, true, Some("0")),
                Fix::ExternalSuggestion(SuggestionRequest::new("use env")),
            )],
        );
        assert!(!outcome.is_fixed());
        assert_eq!(outcome.remaining.len(), 1);
        assert!(artifacts(&dir.path().join("out")).is_empty());
    }
}
