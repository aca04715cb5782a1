use std::{
    env,
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use console::style;
use cip_core::{
    AnalysisEngine, Config, CycleStatus, FileAnalysis, NoopTransformer, Orchestrator,
    ReportFormat, ScanLevel, Severity,
};

/// Code-improvement pipeline CLI entry point.
#[derive(Debug, Parser)]
#[command(name = "cip", about = "Analyze source quality and score it per dimension.")]
struct Args {
    /// Path to config file (YAML). Defaults to cip.yml if present.
    #[arg(long, default_value = "cip.yml")]
    config: PathBuf,

    /// Emit the full JSON analysis result for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Override the configured scan level (basic | standard | thorough).
    #[arg(long, value_name = "LEVEL")]
    scan_level: Option<String>,

    /// Strict mode: exit non-zero when the overall score drops below the warn threshold.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Suppress per-file output.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Files or directories to analyze.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "cip improve",
    about = "Run one analyze/optimize/validate/report improvement cycle."
)]
struct ImproveArgs {
    /// Path to config file (YAML).
    #[arg(long, default_value = "cip.yml")]
    config: PathBuf,

    /// Cap on ranked recommendations handed to the transformer.
    #[arg(long, value_name = "N")]
    max_recommendations: Option<usize>,

    /// Keep transformed files even when validation recommends rollback.
    #[arg(long, action = ArgAction::SetTrue)]
    no_rollback: bool,

    /// Report formats to generate (json | markdown | html | text).
    #[arg(long, value_delimiter = ',', value_name = "FMT[,FMT]")]
    format: Vec<ReportFormat>,

    /// Directory for cycle artifacts.
    #[arg(long, value_name = "DIR", default_value = ".cip")]
    out: PathBuf,

    /// Project root to improve.
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<OsString> = env::args_os().collect();
    if argv.len() > 1 && argv[1].as_os_str() == OsStr::new("improve") {
        let mut forwarded = Vec::with_capacity(argv.len() - 1);
        forwarded.push(argv[0].clone());
        forwarded.extend_from_slice(&argv[2..]);
        let improve_args = ImproveArgs::parse_from(forwarded);
        return run_improve(improve_args);
    }

    let args = Args::parse();
    run_analyze(args)
}

fn run_analyze(args: Args) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.config)?;
    if let Some(level) = &args.scan_level {
        cfg.scan_level = parse_scan_level(level)
            .ok_or_else(|| anyhow::anyhow!("unknown scan level `{level}`"))?;
    }
    let engine = AnalysisEngine::new(cfg.clone());

    let mut files = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            files.extend(engine.collect_files(path)?);
        } else if path.is_file() {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();

    let result = engine.analyze_files(&files)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if !args.quiet {
            for record in &result.files {
                print_file_report(record);
            }
            for error in &result.errors {
                println!(
                    "{} {}: {}",
                    style("error").red().bold(),
                    style(&error.path).cyan(),
                    error.message
                );
            }
        }
        println!(
            "\n{} file(s), {} issue(s), overall score {}",
            result.stats.files_analyzed,
            result.stats.total_issues,
            style(format!("{:.1}", result.overall_score)).bold()
        );
    }

    if result.overall_score < cfg.scores.fail_below
        || (args.strict && result.overall_score < cfg.scores.warn_below)
    {
        std::process::exit(1);
    }
    Ok(())
}

fn run_improve(args: ImproveArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.config)?;
    if let Some(max) = args.max_recommendations {
        cfg.pipeline.max_recommendations = max;
    }
    if args.no_rollback {
        cfg.pipeline.auto_rollback = false;
    }
    if !args.format.is_empty() {
        cfg.pipeline.formats = args.format.clone();
    }

    let scores = cfg.scores.clone();
    let engine = AnalysisEngine::new(cfg);
    // No external transformation service is wired in; the no-op transformer
    // exercises the full state machine without rewriting anything.
    let orchestrator = Orchestrator::new(engine, Box::new(NoopTransformer), &args.out);
    let cycle = orchestrator.run(&args.root)?;

    println!(
        "cycle {} finished: {}",
        style(&cycle.id).cyan(),
        style_status(cycle.status)
    );
    if let Some(analysis) = &cycle.analysis {
        println!("  {}", analysis.summary);
    }
    if !cycle.recommendations.is_empty() {
        println!("  {} recommendation(s):", cycle.recommendations.len());
        for rec in &cycle.recommendations {
            println!(
                "    {}. [{}] {} lines {}-{}",
                rec.priority, rec.optimization_type, rec.file, rec.line_range.0, rec.line_range.1
            );
        }
    }
    if let Some(validation) = &cycle.validation {
        println!(
            "  validation: {} syntax error(s), {} failed test(s), quality {:.1}",
            validation.syntax_error_count, validation.tests_failed, validation.quality_score
        );
    }
    if let Some(score) = cycle.improvement_score {
        println!("  improvement score: {}", style(format!("{score:.1}")).bold());
    }
    for error in &cycle.errors {
        println!("  {} {}", style("error:").red().bold(), error);
    }

    match cycle.status {
        CycleStatus::Completed => {
            let below_fail = cycle
                .analysis
                .as_ref()
                .map(|a| a.overall_score < scores.fail_below)
                .unwrap_or(false);
            if below_fail {
                std::process::exit(1);
            }
            Ok(())
        }
        CycleStatus::RolledBack => std::process::exit(1),
        _ => std::process::exit(2),
    }
}

fn print_file_report(record: &FileAnalysis) {
    println!(
        "{} ({} lines, score {:.1})",
        style(&record.path).bold(),
        record.lines,
        record.score
    );
    if record.issues.is_empty() {
        println!("  {}", style("clean").green());
        return;
    }
    for issue in &record.issues {
        let severity = match issue.severity {
            Severity::Critical | Severity::Error => style(issue.severity).red(),
            Severity::Warning => style(issue.severity).yellow(),
            Severity::Info => style(issue.severity).dim(),
        };
        println!(
            "  [{}] {}:{} {}",
            severity, issue.location.line, issue.location.column, issue.title
        );
        for suggestion in &issue.suggestions {
            println!("      suggestion: {}", suggestion);
        }
    }
}

fn style_status(status: CycleStatus) -> console::StyledObject<CycleStatus> {
    match status {
        CycleStatus::Completed => style(status).green(),
        CycleStatus::RolledBack => style(status).yellow(),
        _ => style(status).red(),
    }
}

fn parse_scan_level(name: &str) -> Option<ScanLevel> {
    match name.trim().to_lowercase().as_str() {
        "basic" => Some(ScanLevel::Basic),
        "standard" => Some(ScanLevel::Standard),
        "thorough" => Some(ScanLevel::Thorough),
        _ => None,
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid config structure in {}", path.display()))?;
        Ok(cfg)
    } else {
        Ok(Config::default())
    }
}
