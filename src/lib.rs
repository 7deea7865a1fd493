//! Rule-based static analysis with matcher dispatch and tiered auto-fixes.
//!
//! A run loads each source file into a [`model::ProgramUnit`] through a
//! [`frontend::Frontend`], hands its nodes to the checkers whose matchers
//! accept them, drops issues silenced by inline directives and, when fixing
//! is enabled, lets the [`autofix::FixEngine`] produce at most one corrected
//! artifact per unit.

pub mod analyzer;
pub mod autofix;
pub mod config;
pub mod defect;
pub mod dispatch;
pub mod error;
pub mod frontend;
pub mod model;
pub mod rules;
pub mod suppression;
pub mod walker;

pub use analyzer::{AnalysisResults, Analyzer, RunContext};
pub use config::Config;
pub use defect::{Defect, Fix, IssueReport, Severity};
pub use dispatch::{CheckerFault, DispatchOutcome, Dispatcher};
pub use error::{Error, Result};
pub use rules::{CheckContext, Checker, Granularity, Matcher, Node, Registry};
