use checkfix::analyzer::{AnalysisResults, Analyzer, RunContext};
use checkfix::config::{Config, ConfigManager};
use checkfix::rules::Registry;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CHECKFIX_LOG";

#[derive(Parser)]
#[command(name = "checkfix")]
#[command(about = "Rule-based static analyzer with tiered auto-fixes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a file or directory
    Check {
        /// Path to check (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Write corrected files for fixable issues
        #[arg(long, short)]
        fix: bool,

        /// Fix mode: text-patch, unit-fix or external-suggestion
        #[arg(long)]
        mode: Option<String>,

        /// Output format (default, json, github)
        #[arg(long, default_value = "default")]
        format: String,

        /// Exit with code 1 if any issues found
        #[arg(long)]
        strict: bool,
    },

    /// List the built-in rules
    Rules,

    /// Show/modify configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Generate default config file
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check {
            path,
            fix,
            mode,
            format,
            strict,
        } => run_check(path, fix, mode, format, strict),
        Commands::Rules => list_rules(),
        Commands::Config { show, init } => handle_config(show, init),
    }
}

fn config_root(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
    } else {
        path.to_path_buf()
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    process::exit(2);
}

fn run_check(path: PathBuf, fix: bool, mode: Option<String>, format: String, strict: bool) {
    let start = Instant::now();
    let config = Config::load_or_default(&config_root(&path));

    let mut ctx = RunContext::new(config);
    let fix = fix || ctx.config.autofix.enabled;
    if fix {
        let mode = mode.unwrap_or_else(|| ctx.config.autofix.mode.clone());
        if let Err(e) = ctx.enable_fixes(&mode) {
            fail(e);
        }
    }
    let analyzer = Analyzer::from_context(ctx);

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Analyzing files...");

    let results = match analyzer.analyze_path(&path) {
        Ok(results) => results,
        Err(e) => {
            pb.finish_and_clear();
            fail(e);
        }
    };
    pb.finish_and_clear();

    match format.as_str() {
        "json" => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(e),
        },
        "github" => print_github(&results),
        _ => print_default(&results, fix, start),
    }

    if strict && results.total_issues() > 0 {
        process::exit(1);
    }
}

fn print_github(results: &AnalysisResults) {
    for (file, issues) in results.sorted_files() {
        for issue in issues {
            println!(
                "::{}::file={},line={},col={}::{}",
                issue.defect.severity.github_level(),
                file.display(),
                issue.defect.start_line,
                issue.defect.start_column,
                issue.defect.description
            );
        }
    }
}

fn print_default(results: &AnalysisResults, fix: bool, start: Instant) {
    let duration = start.elapsed();

    for failure in &results.failures {
        println!("{} {}: {}", "skipped".yellow().bold(), failure.file.display(), failure.message);
    }
    for fault in &results.faults {
        println!(
            "{} rule {} failed on {}: {}",
            "fault".magenta().bold(),
            fault.rule_id,
            fault.node,
            fault.message
        );
    }
    for applied in &results.fixes {
        println!(
            "{} {} ({} at line {}) -> {}",
            "fixed".green().bold(),
            applied.file.display(),
            applied.rule_id,
            applied.line,
            applied.output_path.display()
        );
    }

    let issue_count = results.total_issues();
    if issue_count == 0 {
        println!(
            "{} {} files in {:.1}s",
            "✓ Checked".green().bold(),
            results.file_count(),
            duration.as_secs_f64()
        );
        return;
    }

    for (file, issues) in results.sorted_files() {
        println!("\n{}", file.display().to_string().bold());
        for issue in issues {
            println!("{}", issue.defect.display());
        }
    }

    println!(
        "\n{} {} issues in {} files ({:.1}s)",
        "Found".red().bold(),
        issue_count,
        results.files_with_issues(),
        duration.as_secs_f64()
    );

    if !fix && results.fixable_count() > 0 {
        println!(
            "{} {} issues can be fixed with --fix",
            "→".yellow(),
            results.fixable_count()
        );
    }
}

fn list_rules() {
    let config = Config::load_or_default(Path::new("."));
    for checker in Registry::builtin(&config).checkers() {
        let state = if config.is_enabled(checker.id()) {
            "on".green()
        } else {
            "off".dimmed()
        };
        println!(
            "{:<24} {:<8} {:<4} {}",
            checker.id().bold(),
            config.rule(checker.id()).severity_or(checker.default_severity()).to_string(),
            state,
            checker.description()
        );
    }
}

fn handle_config(show: bool, init: bool) {
    let config_manager = ConfigManager::new();

    if init {
        match config_manager.create_default_config(Path::new(".")) {
            Ok(path) => println!("{} Created {}", "✓".green().bold(), path.display()),
            Err(e) => fail(e),
        }
    } else if show {
        let config = match Config::load(Path::new(".")) {
            Ok(config) => config,
            Err(e) => fail(e),
        };
        match config.to_toml() {
            Ok(toml) => println!("{}", toml),
            Err(e) => fail(e),
        }
    }
}
