use crate::autofix::{FixEngine, SuggestionBackend};
use crate::config::Config;
use crate::defect::IssueReport;
use crate::dispatch::{CheckerFault, Dispatcher};
use crate::error::{ConfigError, Error, FrontendError};
use crate::frontend::FrontendSet;
use crate::model::ProgramUnit;
use crate::rules::Registry;
use crate::suppression;
use crate::walker::{unit_name, SourceWalker};
use ahash::AHashMap;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Everything one run needs, built at its start and dropped at its end.
pub struct RunContext {
    pub config: Config,
    pub dispatcher: Dispatcher,
    pub frontends: FrontendSet,
    pub fix_engine: Option<FixEngine>,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        let registry = Registry::builtin(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: Registry) -> Self {
        let dispatcher = Dispatcher::new(registry.into_checkers(), &config);
        Self {
            config,
            dispatcher,
            frontends: FrontendSet::default(),
            fix_engine: None,
        }
    }

    /// Enables fixing in `mode`. An unknown mode is rejected here, before
    /// anything is dispatched.
    pub fn enable_fixes(&mut self, mode: &str) -> Result<&mut Self, ConfigError> {
        self.fix_engine = Some(FixEngine::for_mode(mode, &self.config.autofix)?);
        Ok(self)
    }

    pub fn enable_fixes_with_backend(
        &mut self,
        mode: &str,
        backend: Arc<dyn SuggestionBackend>,
    ) -> Result<&mut Self, ConfigError> {
        self.fix_engine = Some(FixEngine::with_backend(mode, &self.config.autofix, backend)?);
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
pub struct AppliedFix {
    pub file: PathBuf,
    pub rule_id: String,
    pub line: i64,
    pub output_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub message: String,
}

/// Outcome of one unit: dispatch, then filter, then fix.
#[derive(Debug)]
pub struct UnitResult {
    pub path: PathBuf,
    pub issues: Vec<IssueReport>,
    pub faults: Vec<CheckerFault>,
    pub fixed: Option<AppliedFix>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResults {
    pub file_issues: AHashMap<PathBuf, Vec<IssueReport>>,
    pub faults: Vec<CheckerFault>,
    pub fixes: Vec<AppliedFix>,
    pub failures: Vec<FileFailure>,
    pub stats: AnalysisStats,
}

#[derive(Debug, Default, Serialize)]
pub struct AnalysisStats {
    pub total_files: usize,
    pub files_with_issues: usize,
    pub files_failed: usize,
    pub total_issues: usize,
    pub issues_by_severity: AHashMap<String, usize>,
    pub fixes_applied: usize,
    pub checker_faults: usize,
    pub analysis_time_ms: u128,
}

pub struct Analyzer {
    ctx: RunContext,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        Self::from_context(RunContext::new(config))
    }

    pub fn from_context(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn analyze_path(&self, path: &Path) -> Result<AnalysisResults, Error> {
        let start = Instant::now();
        let walker = SourceWalker::new(&self.ctx.config.ignore);
        let files = walker.walk(path, &self.ctx.frontends)?;

        // the workspace is cleared once, before any unit can write to it
        if let Some(engine) = &self.ctx.fix_engine {
            engine.prepare(path)?;
        }

        let outcomes: DashMap<PathBuf, Result<UnitResult, FrontendError>> = DashMap::new();
        let run = |file: &PathBuf| {
            let name = unit_name(path, file);
            outcomes.insert(file.clone(), self.analyze_file(&name, file));
        };
        if self.ctx.config.performance.parallel {
            files.par_iter().for_each(run);
        } else {
            files.iter().for_each(run);
        }

        let mut results = AnalysisResults::collect(files.len(), outcomes.into_iter());
        results.stats.analysis_time_ms = start.elapsed().as_millis();
        tracing::info!(
            "checked {} files: {} issues, {} fixes, {} failed",
            results.stats.total_files,
            results.stats.total_issues,
            results.stats.fixes_applied,
            results.stats.files_failed
        );
        Ok(results)
    }

    pub fn analyze_file(&self, name: &str, path: &Path) -> Result<UnitResult, FrontendError> {
        let unit = self.ctx.frontends.load(name, path).map_err(|e| {
            tracing::warn!("{}", e);
            e
        })?;
        Ok(self.process_unit(unit))
    }

    /// Checks in-memory source, as an editor sends it. Never fixes.
    pub fn analyze_source(&self, name: &str, path: &Path, source: String) -> Result<UnitResult, FrontendError> {
        let unit = self.ctx.frontends.parse(name, path, source)?;
        Ok(self.check_unit(&unit))
    }

    fn check_unit(&self, unit: &ProgramUnit) -> UnitResult {
        let outcome = self.ctx.dispatcher.dispatch(unit);
        let lines = unit.lines();
        let issues = suppression::filter(&lines, outcome.issues, &self.ctx.config.directives);
        UnitResult {
            path: unit.path.clone(),
            issues,
            faults: outcome.faults,
            fixed: None,
        }
    }

    pub fn process_unit(&self, mut unit: ProgramUnit) -> UnitResult {
        let mut result = self.check_unit(&unit);
        let Some(engine) = &self.ctx.fix_engine else {
            return result;
        };

        let issues = std::mem::take(&mut result.issues);
        let outcome = engine.apply_fix(&mut unit, issues);
        result.issues = outcome.remaining;
        if let (Some(output_path), Some(applied)) = (outcome.output_path, outcome.applied) {
            result.fixed = Some(AppliedFix {
                file: unit.path.clone(),
                rule_id: applied.defect.rule_id,
                line: applied.defect.start_line,
                output_path,
            });
        }
        result
    }
}

impl AnalysisResults {
    fn collect(
        total_files: usize,
        outcomes: impl Iterator<Item = (PathBuf, Result<UnitResult, FrontendError>)>,
    ) -> Self {
        let mut results = AnalysisResults {
            file_issues: AHashMap::new(),
            faults: Vec::new(),
            fixes: Vec::new(),
            failures: Vec::new(),
            stats: AnalysisStats {
                total_files,
                ..AnalysisStats::default()
            },
        };

        for (file, outcome) in outcomes {
            let unit = match outcome {
                Ok(unit) => unit,
                Err(e) => {
                    results.failures.push(FileFailure {
                        file,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            results.faults.extend(unit.faults);
            results.fixes.extend(unit.fixed);
            if !unit.issues.is_empty() {
                for issue in &unit.issues {
                    *results
                        .stats
                        .issues_by_severity
                        .entry(issue.defect.severity.to_string())
                        .or_insert(0) += 1;
                }
                results.stats.total_issues += unit.issues.len();
                results.file_issues.insert(file, unit.issues);
            }
        }

        results.failures.sort_by(|a, b| a.file.cmp(&b.file));
        results.fixes.sort_by(|a, b| a.file.cmp(&b.file));
        results.stats.files_with_issues = results.file_issues.len();
        results.stats.files_failed = results.failures.len();
        results.stats.fixes_applied = results.fixes.len();
        results.stats.checker_faults = results.faults.len();
        results
    }

    pub fn total_issues(&self) -> usize {
        self.stats.total_issues
    }

    pub fn file_count(&self) -> usize {
        self.stats.total_files
    }

    pub fn files_with_issues(&self) -> usize {
        self.stats.files_with_issues
    }

    pub fn fixable_count(&self) -> usize {
        self.file_issues
            .values()
            .flat_map(|issues| issues.iter())
            .filter(|issue| issue.defect.fixable)
            .count()
    }

    /// Files with issues, in path order.
    pub fn sorted_files(&self) -> Vec<(&PathBuf, &Vec<IssueReport>)> {
        let mut files: Vec<_> = self.file_issues.iter().collect();
        files.sort_by(|a, b| a.0.cmp(b.0));
        files
    }
}
