use checkfix::autofix::{SuggestionBackend, SuggestionInput};
use checkfix::error::SuggestionError;
use checkfix::model::{BasicBlock, Class, ControlFlowGraph, ExprKind, Expression, LineIndex, Method, ProgramUnit, Statement, TextRange};
use checkfix::{Analyzer, CheckContext, Checker, Config, Matcher, Node, Registry, RunContext, Severity};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn sequential(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.autofix.output_dir = dir.path().join("out");
    config.performance.parallel = false;
    config
}

#[test]
fn text_patch_run_fixes_first_issue_and_honours_directives() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.rs",
        "fn main() {\n    let d = md5(x);\n    // checkfix-disable-next-line console-output\n    println!(\"a\");\n}\n",
    );

    let mut ctx = RunContext::new(sequential(&dir));
    ctx.enable_fixes("text-patch").unwrap();
    let results = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap();

    assert_eq!(results.stats.fixes_applied, 1);
    let fix = &results.fixes[0];
    assert_eq!(fix.rule_id, "weak-crypto");
    assert_eq!(fix.line, 2);
    assert_eq!(fix.output_path, dir.path().join("out").join("main.rs.fix"));
    assert_eq!(
        fs::read_to_string(&fix.output_path).unwrap(),
        "fn main() {\n    let d = sha256(x);\n    // checkfix-disable-next-line console-output\n    println!(\"a\");\n}\n"
    );
    // the suppressed println never reaches the engine
    assert_eq!(results.total_issues(), 0);
}

struct Rotate;

#[async_trait::async_trait]
impl SuggestionBackend for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    async fn suggest(&self, input: SuggestionInput) -> Result<String, SuggestionError> {
        assert_eq!(input.defect.rule_id, "hardcoded-secret");
        Ok(input.source.replace("\"hunter22\"", "std::env::var(\"PASSWORD\")?"))
    }
}

#[test]
fn external_suggestion_run_uses_backend_output() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/db.rs", "fn connect() {\n    let password = \"hunter22\";\n}\n");

    let mut ctx = RunContext::new(sequential(&dir));
    ctx.enable_fixes_with_backend("external-suggestion", Arc::new(Rotate)).unwrap();
    let results = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap();

    assert_eq!(results.stats.fixes_applied, 1);
    let artifact = fs::read_to_string(dir.path().join("out").join("src.db.rs.fix")).unwrap();
    assert!(artifact.contains("std::env::var(\"PASSWORD\")?"));
    assert!(fs::read_to_string(dir.path().join("src/db.rs")).unwrap().contains("hunter22"));
}

#[test]
fn external_suggestion_without_backend_keeps_issue() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "db.rs", "fn connect() {\n    let password = \"hunter22\";\n}\n");

    let mut ctx = RunContext::new(sequential(&dir));
    ctx.enable_fixes("external-suggestion").unwrap();
    let results = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap();

    assert_eq!(results.stats.fixes_applied, 0);
    assert_eq!(results.total_issues(), 1);
    assert!(!dir.path().join("out").join("db.rs.fix").exists());
}

fn json_unit() -> String {
    let source = "x = md5(data)\n";
    let index = LineIndex::new(source);
    let call = Expression::new(
        ExprKind::Call,
        Some("md5".to_string()),
        "md5(data)",
        index.origin(TextRange::new(4, 13)),
    );
    let statement = Statement::new(0, index.origin(TextRange::new(0, 13)), "x = md5(data)").with_expressions(vec![call]);

    let mut unit = ProgramUnit::new("", "app.py", source);
    unit.classes.push(Class {
        name: "<module>".to_string(),
        origin: None,
        methods: vec![Method {
            name: "<body>".to_string(),
            origin: Some(index.origin(TextRange::new(0, 13))),
            cfg: ControlFlowGraph {
                blocks: vec![BasicBlock {
                    id: 0,
                    statements: vec![statement],
                }],
                edges: Vec::new(),
            },
        }],
    });
    serde_json::to_string(&unit).unwrap()
}

#[test]
fn json_units_go_through_the_same_pipeline() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "models/app.py.unit.json", &json_unit());

    let mut ctx = RunContext::new(sequential(&dir));
    ctx.enable_fixes("text-patch").unwrap();
    let results = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap();

    assert_eq!(results.stats.total_files, 1);
    assert_eq!(results.stats.fixes_applied, 1);
    let artifact = dir.path().join("out").join("models.app.py.fix");
    assert_eq!(fs::read_to_string(artifact).unwrap(), "x = sha256(data)\n");
}

struct Exploding;

impl Checker for Exploding {
    fn id(&self) -> &'static str {
        "exploding"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn description(&self) -> &'static str {
        "Panics on every statement"
    }

    fn register_matchers(&self) -> Vec<Matcher> {
        vec![Matcher::statement()]
    }

    fn check(&self, node: Node<'_>, ctx: &mut CheckContext<'_>) {
        if let Some(origin) = node.origin() {
            let defect = ctx.defect(&origin, "partial");
            ctx.report(defect);
        }
        panic!("checker bug");
    }
}

#[test]
fn panicking_checker_does_not_stop_the_run() {
    let config = Config::default();
    let mut registry = Registry::builtin(&config);
    registry.register(Box::new(Exploding));
    let analyzer = Analyzer::from_context(RunContext::with_registry(config, registry));

    let result = analyzer
        .analyze_source(
            "a.rs",
            Path::new("a.rs"),
            "fn a() {\n    let d = md5(x);\n    run();\n}\n".to_string(),
        )
        .unwrap();

    assert_eq!(result.faults.len(), 2);
    assert!(result.faults.iter().all(|fault| fault.rule_id == "exploding"));
    assert!(result.faults[0].message.contains("checker bug"));
    let rules: Vec<&str> = result.issues.iter().map(|issue| issue.rule_id()).collect();
    assert_eq!(rules, vec!["weak-crypto"]);
}

#[test]
fn unit_fix_never_removes_statements_that_do_more_than_print() {
    let dir = TempDir::new().unwrap();
    let source = "fn main() {\n    match mode() {\n        0 => println!(\"zero\"),\n        _ => launch(),\n    }\n    let n = dbg!(compute());\n    use_it(n);\n}\n";
    write(dir.path(), "main.rs", source);

    let mut ctx = RunContext::new(sequential(&dir));
    ctx.enable_fixes("unit-fix").unwrap();
    let results = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap();

    assert_eq!(results.stats.fixes_applied, 0);
    assert!(!dir.path().join("out").join("main.rs.fix").exists());
    let issues = &results.file_issues[&dir.path().join("main.rs")];
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|issue| issue.rule_id() == "console-output" && !issue.defect.fixable));
}

#[test]
fn output_dir_over_the_sources_is_refused() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.rs", "fn main() {\n    println!(\"a\");\n}\n");
    let mut config = sequential(&dir);
    config.autofix.output_dir = dir.path().join("src");

    let mut ctx = RunContext::new(config);
    ctx.enable_fixes("unit-fix").unwrap();
    let err = Analyzer::from_context(ctx).analyze_path(dir.path()).unwrap_err();

    assert!(err.to_string().contains("refusing to clear"));
    assert!(dir.path().join("src/main.rs").exists());
}
