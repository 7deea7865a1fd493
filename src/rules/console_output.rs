use super::*;
use crate::defect::UnitFix;

/// Flags statements that write straight to stdout/stderr. Such output bypasses
/// the logging pipeline and tends to leak request data.
pub struct ConsoleOutputRule;

const OUTPUT_NAMES: &[&str] = &["println", "print", "eprintln", "eprint", "dbg"];

impl ConsoleOutputRule {
    pub const ID: &'static str = "console-output";

    fn output_call(statement: &Statement) -> Option<&Expression> {
        statement.expressions.iter().find(|expr| {
            matches!(expr.kind, ExprKind::Macro | ExprKind::Call | ExprKind::MethodCall)
                && expr.name.as_deref().map_or(false, |name| OUTPUT_NAMES.contains(&name))
        })
    }

    /// Removing the statement is only safe when the output call is all of it.
    /// `dbg!` passes its argument through, so it is never removed.
    fn is_removable(statement: &Statement, call: &Expression) -> bool {
        let bare = statement.text.trim_end().trim_end_matches(';').trim_end();
        call.name.as_deref() != Some("dbg")
            && call.origin.span.start == statement.origin.span.start
            && bare == call.text
    }

    /// Removes the statement whose id is `fix_key`.
    pub fn removal_fix() -> UnitFix {
        UnitFix::new("Remove console output statement", |unit, fix_key| {
            let Ok(id) = fix_key.parse::<usize>() else {
                return false;
            };
            match unit.statement_mut(id) {
                Some(stmt) if !stmt.is_edited() => {
                    stmt.remove();
                    true
                }
                _ => false,
            }
        })
    }
}

impl Checker for ConsoleOutputRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &'static str {
        "Console output instead of structured logging"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::statement().when(|node| match node {
            Node::Statement { statement, .. } => Self::output_call(statement).is_some(),
            _ => false,
        })]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Statement { statement, .. } = node else {
            return;
        };
        let Some(call) = Self::output_call(statement) else {
            return;
        };
        let name = call.name.as_deref().unwrap_or("println");

        let defect = ctx.defect_at(
            &statement.origin,
            name,
            format!("`{}` writes to the console - use the logger instead", name),
        );
        if Self::is_removable(statement, call) {
            ctx.report_with_fix(
                defect,
                Some(statement.id.to_string()),
                Fix::UnitFix(Self::removal_fix()),
            );
        } else {
            ctx.report(defect);
        }
    }
}
