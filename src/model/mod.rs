//! Program model consumed by the dispatcher.
//!
//! A [`ProgramUnit`] is one source file: classes, their methods, each method's
//! control-flow graph, its statements and their expressions. Every node that
//! comes from real source carries an [`Origin`]. Front-ends build the model;
//! checkers only read it; the unit-fix strategy mutates statements and prints
//! the unit back out with [`printer::UnitPrinter`].

pub mod printer;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use printer::UnitPrinter;

/// Half-open byte range into [`ProgramUnit::source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Where a node starts in the source. Lines and columns are 1-based; the
/// column counts bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub line: usize,
    pub column: usize,
    pub span: TextRange,
}

impl Origin {
    pub fn new(line: usize, column: usize, span: TextRange) -> Self {
        Self { line, column, span }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramUnit {
    /// Identity of the unit within a run, usually the path relative to the
    /// analysis root.
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    #[serde(default)]
    pub classes: Vec<Class>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// `None` for synthetic methods that have no source of their own.
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub cfg: ControlFlowGraph,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    /// `(from, to)` pairs of block ids.
    #[serde(default)]
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: usize,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Unique within the unit; fix keys refer to statements by this id.
    pub id: usize,
    pub origin: Origin,
    pub text: String,
    #[serde(default)]
    pub expressions: Vec<Expression>,
    #[serde(skip)]
    edit: Option<StatementEdit>,
}

/// A pending change to a statement, materialised by the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementEdit {
    Replace(String),
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Call,
    MethodCall,
    Macro,
    StringLiteral,
    NumberLiteral,
    Binary,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExprKind,
    /// Callee, macro or operator name where the kind has one.
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
    pub origin: Origin,
}

impl ProgramUnit {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source: source.into(),
            classes: Vec::new(),
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        self.source.lines().collect()
    }

    /// 1-based line lookup.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        line.checked_sub(1).and_then(|idx| self.source.lines().nth(idx))
    }

    /// Text of `origin` up to the end of its first line.
    pub fn origin_line_text(&self, origin: &Origin) -> &str {
        let end = origin.span.end.min(self.source.len());
        let start = origin.span.start.min(end);
        let text = self.source.get(start..end).unwrap_or("");
        text.split('\n').next().unwrap_or("")
    }

    /// File name for the fixed artifact of this unit, unique per unit name.
    pub fn output_name(&self) -> String {
        let flattened: String = self
            .name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '.' } else { c })
            .collect();
        format!("{}.fix", flattened.trim_start_matches('.'))
    }

    pub fn methods(&self) -> impl Iterator<Item = (&Class, &Method)> {
        self.classes
            .iter()
            .flat_map(|class| class.methods.iter().map(move |method| (class, method)))
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.methods()
            .flat_map(|(_, method)| method.cfg.blocks.iter())
            .flat_map(|block| block.statements.iter())
    }

    pub fn statements_mut(&mut self) -> impl Iterator<Item = &mut Statement> {
        self.classes
            .iter_mut()
            .flat_map(|class| class.methods.iter_mut())
            .flat_map(|method| method.cfg.blocks.iter_mut())
            .flat_map(|block| block.statements.iter_mut())
    }

    pub fn statement_mut(&mut self, id: usize) -> Option<&mut Statement> {
        self.statements_mut().find(|stmt| stmt.id == id)
    }

    pub fn has_edits(&self) -> bool {
        self.statements().any(Statement::is_edited)
    }

    /// Checks that every origin points inside the source on char boundaries.
    pub fn validate(&self) -> Result<(), String> {
        let check = |what: &str, origin: &Origin| -> Result<(), String> {
            let span = origin.span;
            if span.start > span.end
                || span.end > self.source.len()
                || !self.source.is_char_boundary(span.start)
                || !self.source.is_char_boundary(span.end)
            {
                return Err(format!(
                    "{} span {}..{} is outside the {}-byte source",
                    what,
                    span.start,
                    span.end,
                    self.source.len()
                ));
            }
            if origin.line == 0 {
                return Err(format!("{} has line 0", what));
            }
            Ok(())
        };

        for class in &self.classes {
            if let Some(origin) = &class.origin {
                check(format!("class '{}'", class.name).as_str(), origin)?;
            }
            for method in &class.methods {
                if let Some(origin) = &method.origin {
                    check(format!("method '{}'", method.name).as_str(), origin)?;
                }
                for stmt in method.cfg.blocks.iter().flat_map(|b| b.statements.iter()) {
                    check(format!("statement {}", stmt.id).as_str(), &stmt.origin)?;
                    for expr in &stmt.expressions {
                        check(format!("expression in statement {}", stmt.id).as_str(), &expr.origin)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn file_name(&self) -> Option<&str> {
        Path::new(&self.name).file_name().and_then(|n| n.to_str())
    }
}

impl Method {
    pub fn is_synthetic(&self) -> bool {
        self.origin.is_none()
    }

    pub fn statement_count(&self) -> usize {
        self.cfg.blocks.iter().map(|b| b.statements.len()).sum()
    }
}

impl ControlFlowGraph {
    /// Every statement of the graph, ordered by position in the source.
    pub fn statements(&self) -> Vec<&Statement> {
        let mut stmts: Vec<&Statement> = self.blocks.iter().flat_map(|b| b.statements.iter()).collect();
        stmts.sort_by_key(|s| (s.origin.span.start, s.id));
        stmts
    }

    pub fn successors(&self, block: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |(from, _)| *from == block)
            .map(|(_, to)| *to)
    }
}

impl Statement {
    pub fn new(id: usize, origin: Origin, text: impl Into<String>) -> Self {
        Self {
            id,
            origin,
            text: text.into(),
            expressions: Vec::new(),
            edit: None,
        }
    }

    pub fn with_expressions(mut self, expressions: Vec<Expression>) -> Self {
        self.expressions = expressions;
        self
    }

    pub fn replace(&mut self, text: impl Into<String>) {
        self.edit = Some(StatementEdit::Replace(text.into()));
    }

    pub fn remove(&mut self) {
        self.edit = Some(StatementEdit::Remove);
    }

    pub fn edit(&self) -> Option<&StatementEdit> {
        self.edit.as_ref()
    }

    pub fn is_edited(&self) -> bool {
        self.edit.is_some()
    }
}

impl Expression {
    pub fn new(kind: ExprKind, name: Option<String>, text: impl Into<String>, origin: Origin) -> Self {
        Self {
            kind,
            name,
            text: text.into(),
            origin,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

/// Maps between byte offsets and line/column positions of a source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Byte offset of a 1-based line and a 0-based character column.
    pub fn offset(&self, source: &str, line: usize, char_column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let rest = source.get(start..)?;
        let mut chars = rest.char_indices();
        match chars.nth(char_column) {
            Some((idx, _)) => Some(start + idx),
            None if rest.chars().count() == char_column => Some(self.len),
            None => None,
        }
    }

    /// 1-based line and 1-based byte column of `offset`.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        (line_idx + 1, offset - self.line_starts[line_idx] + 1)
    }

    pub fn origin(&self, span: TextRange) -> Origin {
        let (line, column) = self.position(span.start);
        Origin::new(line, column, span)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
