//! Checker capability interface and the built-in rule set.
//!
//! A checker declares the program entities it wants through [`Matcher`]s and
//! receives matching nodes in [`Checker::check`]. Findings go into the
//! [`CheckContext`] the dispatcher hands it for the current unit.

use crate::config::{Config, RuleSettings};
use crate::defect::{Defect, Fix, IssueReport, Severity};
use crate::model::{Class, ControlFlowGraph, ExprKind, Expression, Method, Origin, ProgramUnit, Statement, TextRange};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

mod complexity;
mod console_output;
mod hardcoded_secret;
mod sql_injection;
mod weak_crypto;

pub use complexity::*;
pub use console_output::*;
pub use hardcoded_secret::*;
pub use sql_injection::*;
pub use weak_crypto::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    File,
    Class,
    Method,
    Statement,
    Expression,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::File,
        Granularity::Class,
        Granularity::Method,
        Granularity::Statement,
        Granularity::Expression,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::File => "file",
            Granularity::Class => "class",
            Granularity::Method => "method",
            Granularity::Statement => "statement",
            Granularity::Expression => "expression",
        };
        write!(f, "{}", name)
    }
}

/// A program entity handed to a checker, with its enclosing node.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    File(&'a ProgramUnit),
    Class(&'a Class),
    Method {
        class: &'a Class,
        method: &'a Method,
    },
    Statement {
        method: &'a Method,
        statement: &'a Statement,
    },
    Expression {
        statement: &'a Statement,
        expression: &'a Expression,
    },
}

impl<'a> Node<'a> {
    pub fn granularity(&self) -> Granularity {
        match self {
            Node::File(_) => Granularity::File,
            Node::Class(_) => Granularity::Class,
            Node::Method { .. } => Granularity::Method,
            Node::Statement { .. } => Granularity::Statement,
            Node::Expression { .. } => Granularity::Expression,
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            Node::File(_) => None,
            Node::Class(class) => class.origin,
            Node::Method { method, .. } => method.origin,
            Node::Statement { statement, .. } => Some(statement.origin),
            Node::Expression { expression, .. } => Some(expression.origin),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Node::File(unit) => format!("file {}", unit.name),
            Node::Class(class) => format!("class {}", class.name),
            Node::Method { class, method } => format!("method {}::{}", class.name, method.name),
            Node::Statement { method, statement } => {
                format!("statement {} in {}", statement.id, method.name)
            }
            Node::Expression { statement, expression } => format!(
                "{:?} expression in statement {}",
                expression.kind, statement.id
            ),
        }
    }
}

pub type Selector = Arc<dyn Fn(&Node<'_>) -> bool + Send + Sync>;

/// Declares which nodes of one granularity a checker wants to see.
#[derive(Clone)]
pub struct Matcher {
    pub granularity: Granularity,
    selector: Option<Selector>,
}

impl Matcher {
    /// Accepts every node of `granularity`.
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            selector: None,
        }
    }

    pub fn file() -> Self {
        Self::new(Granularity::File)
    }

    pub fn class() -> Self {
        Self::new(Granularity::Class)
    }

    pub fn method() -> Self {
        Self::new(Granularity::Method)
    }

    pub fn statement() -> Self {
        Self::new(Granularity::Statement)
    }

    pub fn expression() -> Self {
        Self::new(Granularity::Expression)
    }

    /// Narrows the matcher with a predicate.
    pub fn when<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Node<'_>) -> bool + Send + Sync + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    /// Expressions of one of `kinds` whose name, or the last segment of a
    /// path name such as `sqlx::query`, is in `names`.
    pub fn named_expressions(kinds: &'static [ExprKind], names: &'static [&'static str]) -> Self {
        Self::expression().when(move |node| match node {
            Node::Expression { expression, .. } => {
                kinds.contains(&expression.kind)
                    && expression.name.as_deref().map_or(false, |name| {
                        let last = name.rsplit("::").next().unwrap_or(name);
                        names.contains(&name) || names.contains(&last)
                    })
            }
            _ => false,
        })
    }

    pub fn accepts(&self, node: &Node<'_>) -> bool {
        node.granularity() == self.granularity && self.selector.as_ref().map_or(true, |select| select(node))
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("granularity", &self.granularity)
            .field("selective", &self.selector.is_some())
            .finish()
    }
}

pub trait Checker: Send + Sync {
    /// Stable rule identifier, also the key of its `[rules.<id>]` section.
    fn id(&self) -> &'static str;

    fn default_severity(&self) -> Severity;

    fn description(&self) -> &'static str;

    fn doc_path(&self) -> String {
        format!("docs/rules/{}.md", self.id())
    }

    /// Called once per run, before any unit is dispatched.
    fn register_matchers(&self) -> Vec<Matcher>;

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>);
}

/// Per-unit, per-checker sink for findings.
pub struct CheckContext<'a> {
    unit: &'a ProgramUnit,
    rule_id: &'static str,
    severity: Severity,
    doc_path: String,
    issues: Vec<IssueReport>,
}

impl<'a> CheckContext<'a> {
    pub fn new(unit: &'a ProgramUnit, checker: &dyn Checker, settings: &RuleSettings) -> Self {
        Self {
            unit,
            rule_id: checker.id(),
            severity: settings.severity_or(checker.default_severity()),
            doc_path: checker.doc_path(),
            issues: Vec::new(),
        }
    }

    pub fn unit(&self) -> &'a ProgramUnit {
        self.unit
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Origin covering the first line of the unit, for file-level findings.
    pub fn unit_origin(&self) -> Origin {
        let end = self.unit.source.find('\n').unwrap_or(self.unit.source.len());
        Origin::new(1, 1, TextRange::new(0, end))
    }

    /// Column of the last occurrence of `token` on the first line of
    /// `origin`, or the origin's own column when the token is not there.
    pub fn column_of(&self, origin: &Origin, token: &str) -> usize {
        self.unit
            .origin_line_text(origin)
            .rfind(token)
            .map_or(origin.column, |offset| origin.column + offset)
    }

    /// Defect spanning the first line of `origin`.
    pub fn defect(&self, origin: &Origin, description: impl Into<String>) -> Defect {
        let width = self.unit.origin_line_text(origin).len();
        self.build(origin.line, origin.column, origin.column + width, description.into())
    }

    /// Defect anchored on the last occurrence of `token` in the origin's line.
    pub fn defect_at(&self, origin: &Origin, token: &str, description: impl Into<String>) -> Defect {
        let column = self.column_of(origin, token);
        self.build(origin.line, column, column + token.len(), description.into())
    }

    fn build(&self, line: usize, start_column: usize, end_column: usize, description: String) -> Defect {
        Defect {
            rule_id: self.rule_id.to_string(),
            file_path: self.unit.path.clone(),
            severity: self.severity,
            start_line: i64::try_from(line).unwrap_or(crate::defect::NO_LINE),
            start_column,
            end_column,
            description,
            fixable: false,
            fix_key: None,
            doc_path: self.doc_path.clone(),
        }
    }

    pub fn report(&mut self, defect: Defect) {
        self.issues.push(IssueReport::new(defect));
    }

    /// Reports a fixable defect; `fix_key` is handed back to the fix later.
    pub fn report_with_fix(&mut self, mut defect: Defect, fix_key: Option<String>, fix: Fix) {
        defect.fixable = true;
        defect.fix_key = fix_key;
        self.issues.push(IssueReport::with_fix(defect, fix));
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.issues.truncate(len);
    }

    pub fn into_issues(self) -> Vec<IssueReport> {
        self.issues
    }
}

/// Ordered collection of checkers; registration order is dispatch order.
#[derive(Default)]
pub struct Registry {
    checkers: Vec<Box<dyn Checker>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in rules, configured from `config`.
    pub fn builtin(config: &Config) -> Self {
        let mut registry = Self::new();
        registry
            .register(Box::new(ConsoleOutputRule))
            .register(Box::new(WeakCryptoRule))
            .register(Box::new(HardcodedSecretRule::from_settings(&config.rule(HardcodedSecretRule::ID))))
            .register(Box::new(SqlInjectionRule))
            .register(Box::new(LongMethodRule::from_settings(&config.rule(LongMethodRule::ID))))
            .register(Box::new(CyclomaticComplexityRule::from_settings(
                &config.rule(CyclomaticComplexityRule::ID),
            )))
            .register(Box::new(LargeClassRule::from_settings(&config.rule(LargeClassRule::ID))))
            .register(Box::new(LargeUnitRule::from_settings(&config.rule(LargeUnitRule::ID))));
        registry
    }

    pub fn register(&mut self, checker: Box<dyn Checker>) -> &mut Self {
        self.checkers.push(checker);
        self
    }

    pub fn checkers(&self) -> &[Box<dyn Checker>] {
        &self.checkers
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    pub fn into_checkers(self) -> Vec<Box<dyn Checker>> {
        self.checkers
    }
}
