use super::*;
use crate::defect::SuggestionRequest;
use once_cell::sync::Lazy;
use regex::Regex;

const DEFAULT_NAMES: &[&str] = &["password", "passwd", "secret", "api_?key", "access_?token", "private_?key"];

static DEFAULT_PATTERN: Lazy<Regex> =
    Lazy::new(|| build_pattern(DEFAULT_NAMES.iter().copied()).expect("default secret pattern is valid"));

fn build_pattern<'a>(names: impl Iterator<Item = &'a str>) -> Result<Regex, regex::Error> {
    let alternation = names.collect::<Vec<_>>().join("|");
    let pattern = format!(
        r#"(?i)\b(?P<name>\w*(?:{})\w*)\s*(?::\s*[\w&<>]+\s*)?(?:=|:|=>)\s*"(?P<value>[^"]{{4,}})""#,
        alternation
    );
    Regex::new(&pattern)
}

/// String literals bound to secret-looking names.
pub struct HardcodedSecretRule {
    pattern: Regex,
}

impl HardcodedSecretRule {
    pub const ID: &'static str = "hardcoded-secret";

    /// `options.names` adds extra literal name fragments to look for.
    pub fn from_settings(settings: &RuleSettings) -> Self {
        let pattern = match settings.string_list_option("names") {
            Some(extra) if !extra.is_empty() => {
                let escaped: Vec<String> = extra.iter().map(|name| regex::escape(name)).collect();
                build_pattern(DEFAULT_NAMES.iter().copied().chain(escaped.iter().map(String::as_str)))
                    .unwrap_or_else(|_| DEFAULT_PATTERN.clone())
            }
            _ => DEFAULT_PATTERN.clone(),
        };
        Self { pattern }
    }
}

impl Default for HardcodedSecretRule {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
        }
    }
}

impl Checker for HardcodedSecretRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn description(&self) -> &'static str {
        "Credential embedded in source code"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::statement()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Statement { statement, .. } = node else {
            return;
        };
        let first_line = ctx.unit().origin_line_text(&statement.origin);
        let Some(caps) = self.pattern.captures(first_line) else {
            return;
        };
        let name = caps.name("name").map_or("", |m| m.as_str());
        let value = caps.name("value").map_or("", |m| m.as_str());
        // placeholders and env lookups are not secrets
        if value.starts_with("${") || value.chars().all(|c| c == '*' || c == 'x' || c == 'X') {
            return;
        }

        let defect = ctx.defect_at(
            &statement.origin,
            name,
            format!("`{}` is assigned a hard-coded credential", name),
        );
        let request = SuggestionRequest::new(format!(
            "Load `{}` from the environment or a secret store instead of embedding it",
            name
        ));
        ctx.report_with_fix(defect, Some(statement.id.to_string()), Fix::ExternalSuggestion(request));
    }
}
