use super::*;
use crate::defect::TextPatch;

/// Calls into broken hash functions and ciphers.
pub struct WeakCryptoRule;

/// Weak algorithm name (lowercase) and its replacement, if a drop-in one exists.
const WEAK_ALGORITHMS: &[(&str, Option<&str>)] = &[
    ("md5", Some("sha256")),
    ("md4", Some("sha256")),
    ("sha1", Some("sha256")),
    ("des", None),
    ("rc4", None),
];

impl WeakCryptoRule {
    pub const ID: &'static str = "weak-crypto";

    /// First path segment of the callee naming a weak algorithm.
    fn weak_segment(expression: &Expression) -> Option<(&str, Option<&'static str>)> {
        let name = expression.name.as_deref()?;
        name.split(|c| c == ':' || c == '.')
            .filter(|segment| !segment.is_empty())
            .find_map(|segment| {
                let lower = segment.to_ascii_lowercase();
                WEAK_ALGORITHMS
                    .iter()
                    .find(|(weak, _)| *weak == lower)
                    .map(|(_, replacement)| (segment, *replacement))
            })
    }

    /// Keeps the case style of the original segment (`Md5` → `Sha256`).
    fn match_case(original: &str, replacement: &str) -> String {
        if original.chars().next().map_or(false, char::is_uppercase) {
            let mut chars = replacement.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().collect::<String>() + chars.as_str())
                .unwrap_or_default()
        } else {
            replacement.to_string()
        }
    }
}

impl Checker for WeakCryptoRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn description(&self) -> &'static str {
        "Use of a broken hash function or cipher"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::expression().when(|node| match node {
            Node::Expression { expression, .. } => {
                matches!(expression.kind, ExprKind::Call | ExprKind::MethodCall)
                    && Self::weak_segment(expression).is_some()
            }
            _ => false,
        })]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Expression { expression, .. } = node else {
            return;
        };
        let Some((segment, replacement)) = Self::weak_segment(expression) else {
            return;
        };

        let defect = ctx.defect_at(
            &expression.origin,
            segment,
            format!("`{}` is cryptographically broken", segment),
        );

        let offset = expression.text.find(segment);
        match (replacement, offset) {
            (Some(replacement), Some(offset)) => {
                let start = expression.origin.span.start + offset;
                let range = TextRange::new(start, start + segment.len());
                let new_name = Self::match_case(segment, replacement);
                let patch = TextPatch::new(format!("Replace `{}` with `{}`", segment, new_name)).replace(
                    &ctx.unit().source,
                    range,
                    new_name,
                );
                ctx.report_with_fix(defect, None, Fix::TextPatch(patch));
            }
            _ => ctx.report(defect),
        }
    }
}
