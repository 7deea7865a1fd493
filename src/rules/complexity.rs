use super::*;

pub struct LongMethodRule {
    max_statements: usize,
}

impl LongMethodRule {
    pub const ID: &'static str = "long-method";

    pub fn new(max_statements: usize) -> Self {
        Self { max_statements }
    }

    pub fn from_settings(settings: &RuleSettings) -> Self {
        Self::new(settings.usize_option("max_statements").unwrap_or(50))
    }
}

impl Checker for LongMethodRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &'static str {
        "Method body has too many statements"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::method()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Method { class, method } = node else {
            return;
        };
        let Some(origin) = method.origin else {
            return;
        };
        let count = method.statement_count();
        if count > self.max_statements {
            let defect = ctx.defect_at(
                &origin,
                &method.name,
                format!(
                    "Method '{}::{}' has {} statements (max: {})",
                    class.name, method.name, count, self.max_statements
                ),
            );
            ctx.report(defect);
        }
    }
}

/// McCabe complexity from the method's control-flow graph: `E - N + 2`.
pub struct CyclomaticComplexityRule {
    max_complexity: usize,
}

impl CyclomaticComplexityRule {
    pub const ID: &'static str = "cyclomatic-complexity";

    pub fn new(max_complexity: usize) -> Self {
        Self { max_complexity }
    }

    pub fn from_settings(settings: &RuleSettings) -> Self {
        Self::new(settings.usize_option("max_complexity").unwrap_or(10))
    }
}

pub fn cyclomatic_complexity(cfg: &ControlFlowGraph) -> usize {
    let nodes = cfg.blocks.len();
    if nodes == 0 {
        return 1;
    }
    (cfg.edges.len() + 2).saturating_sub(nodes).max(1)
}

impl Checker for CyclomaticComplexityRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &'static str {
        "Method has too many independent paths"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::method()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Method { class, method } = node else {
            return;
        };
        let Some(origin) = method.origin else {
            return;
        };
        let complexity = cyclomatic_complexity(&method.cfg);
        if complexity > self.max_complexity {
            let defect = ctx.defect_at(
                &origin,
                &method.name,
                format!(
                    "Method '{}::{}' has cyclomatic complexity of {} (max: {})",
                    class.name, method.name, complexity, self.max_complexity
                ),
            );
            ctx.report(defect);
        }
    }
}

pub struct LargeClassRule {
    max_methods: usize,
}

impl LargeClassRule {
    pub const ID: &'static str = "large-class";

    pub fn new(max_methods: usize) -> Self {
        Self { max_methods }
    }

    pub fn from_settings(settings: &RuleSettings) -> Self {
        Self::new(settings.usize_option("max_methods").unwrap_or(30))
    }
}

impl Checker for LargeClassRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &'static str {
        "Class declares too many methods"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::class()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::Class(class) = node else {
            return;
        };
        // synthetic methods are not the author's to split
        let count = class.methods.iter().filter(|m| !m.is_synthetic()).count();
        if count <= self.max_methods {
            return;
        }
        let origin = class.origin.unwrap_or_else(|| ctx.unit_origin());
        let defect = ctx.defect(
            &origin,
            format!("'{}' has {} methods (max: {})", class.name, count, self.max_methods),
        );
        ctx.report(defect);
    }
}

pub struct LargeUnitRule {
    max_lines: usize,
}

impl LargeUnitRule {
    pub const ID: &'static str = "large-unit";

    pub fn new(max_lines: usize) -> Self {
        Self { max_lines }
    }

    pub fn from_settings(settings: &RuleSettings) -> Self {
        Self::new(settings.usize_option("max_lines").unwrap_or(1_000))
    }
}

impl Checker for LargeUnitRule {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn description(&self) -> &'static str {
        "Source file is too long"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::file()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        let Node::File(unit) = node else {
            return;
        };
        let lines = unit.source.lines().count();
        if lines > self.max_lines {
            let defect = ctx.defect(
                &ctx.unit_origin(),
                format!("File has {} lines (max: {})", lines, self.max_lines),
            );
            ctx.report(defect);
        }
    }
}
