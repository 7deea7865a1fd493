//! Inline disable directives.
//!
//! A line containing the file marker anywhere in a unit silences every issue
//! in it. A line containing the next-line marker and a rule id silences that
//! rule on the following line.

use crate::config::DirectiveConfig;
use crate::defect::IssueReport;

/// Drops issues silenced by directives in `lines`, keeping the order of the
/// rest. Issues without a usable line are dropped as well.
pub fn filter(lines: &[&str], issues: Vec<IssueReport>, directives: &DirectiveConfig) -> Vec<IssueReport> {
    let file_marker = directives.file.as_str();
    if !file_marker.is_empty() && lines.iter().any(|line| line.contains(file_marker)) {
        tracing::debug!("file-wide directive drops {} issues", issues.len());
        return Vec::new();
    }

    issues
        .into_iter()
        .filter(|issue| !is_suppressed(lines, issue, directives))
        .collect()
}

fn is_suppressed(lines: &[&str], issue: &IssueReport, directives: &DirectiveConfig) -> bool {
    let line = issue.line();
    let Ok(line) = usize::try_from(line) else {
        return true;
    };
    if line == 0 || line > lines.len() {
        return true;
    }
    if line < 2 {
        return false;
    }

    let previous = lines[line - 2];
    !directives.next_line.is_empty()
        && previous.contains(directives.next_line.as_str())
        && previous.contains(issue.rule_id())
}
