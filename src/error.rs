//! Error types for checkfix.
//!
//! Each layer owns its error enum; [`Error`] collects them for callers that
//! drive a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for a checkfix run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("front-end error: {0}")]
    Frontend(#[from] FrontendError),

    #[error("fix error: {0}")]
    Fix(#[from] FixError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration problems. These are fatal and surface before any dispatch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported fix mode '{0}' (expected text-patch, unit-fix or external-suggestion)")]
    UnsupportedMode(String),

    #[error("invalid ignore pattern '{pattern}': {message}")]
    InvalidIgnore { pattern: String, message: String },

    #[error("directive marker `directives.{0}` must not be empty")]
    EmptyDirective(&'static str),

    #[error("refusing to clear output directory {path}: {reason}")]
    UnsafeOutputDir { path: PathBuf, reason: String },
}

/// Failures while turning a source file into a program unit.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid program model for {path}: {message}")]
    InvalidModel { path: PathBuf, message: String },

    #[error("no front-end accepts {0}")]
    Unsupported(PathBuf),
}

/// Reasons a single fix attempt did not produce an artifact.
///
/// None of these abort a run; the issue is reported as unresolved.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("patch edit {index} is out of bounds ({start}..{end} in {len} bytes)")]
    OutOfBounds {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("patch edits {first} and {second} overlap")]
    Overlap { first: usize, second: usize },

    #[error("patch edit {index} anchor no longer matches the source")]
    StaleAnchor { index: usize },

    #[error("fix key '{0}' did not apply to this unit")]
    NotApplicable(String),

    #[error("failed to print unit: {0}")]
    Print(#[from] PrintError),

    #[error("external suggestion failed: {0}")]
    Suggestion(#[from] SuggestionError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the unit printer.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("statement {first} and statement {second} have overlapping edits")]
    OverlappingEdits { first: usize, second: usize },

    #[error("statement {0} has a span outside the unit source")]
    SpanOutOfRange(usize),
}

/// Failures of the external suggestion backend.
#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("suggestion backend is unavailable")]
    Unavailable,

    #[error("suggestion timed out after {0} ms")]
    Timeout(u64),

    #[error("suggestion backend returned no content")]
    Empty,

    #[error("suggestion backend failed: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
