use super::*;
use once_cell::sync::Lazy;
use regex::Regex;

static DYNAMIC_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"format!\s*\(|String\.format\s*\(|"\s*\+|\+\s*"|\.concat\s*\(|\.push_str\s*\("#)
        .expect("dynamic string pattern is valid")
});

const QUERY_CALLS: &[&str] = &[
    "query",
    "query_as",
    "execute",
    "exec",
    "executeQuery",
    "executeUpdate",
    "prepare",
    "prepareStatement",
    "raw",
];

/// Query calls whose SQL text is assembled from strings at runtime.
pub struct SqlInjectionRule;

impl SqlInjectionRule {
    pub const ID: &'static str = "sql-injection";
}

impl Checker for SqlInjectionRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn description(&self) -> &'static str {
        "SQL query built by string concatenation or formatting"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::named_expressions(&[ExprKind::Call, ExprKind::MethodCall], QUERY_CALLS)]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Expression { expression, .. } = node else {
            return;
        };
        let name = expression.name.as_deref().unwrap_or("query");
        // only look at the argument list, not the receiver
        let args = expression
            .text
            .rfind(name)
            .map_or(expression.text.as_str(), |i| &expression.text[i + name.len()..]);
        if !DYNAMIC_STRING.is_match(args) {
            return;
        }

        let defect = ctx.defect_at(
            &expression.origin,
            name,
            format!("`{}` receives SQL assembled at runtime - use bound parameters", name),
        );
        ctx.report(defect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::unit_from_lines;

    fn run(source: &str) -> Vec<IssueReport> {
        let unit = unit_from_lines("Dao.java", source);
        let mut ctx = CheckContext::new(&unit, &SqlInjectionRule, &RuleSettings::default());
        let matcher = &SqlInjectionRule.register_matchers()[0];
        for stmt in unit.statements() {
            for expr in &stmt.expressions {
                let node = Node::Expression { statement: stmt, expression: expr };
                if matcher.accepts(&node) {
                    SqlInjectionRule.check(node, &mut ctx);
                }
            }
        }
        ctx.into_issues()
    }

    #[test]
    fn test_concatenated_query() {
        let issues = run("class Dao {\n    stmt.executeQuery(\"SELECT * FROM users WHERE id = \" + id);\n}\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].defect.severity, Severity::Error);
        assert!(issues[0].fix.is_none());
    }

    #[test]
    fn test_parameterised_query_is_fine() {
        let issues = run("class Dao {\n    stmt.executeQuery(\"SELECT * FROM users WHERE id = ?\");\n}\n");
        assert!(issues.is_empty());
    }
}
