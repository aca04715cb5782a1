use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use cip_core::{
    AnalysisEngine, Config, CycleStatus, FileTransformation, NoopTransformer,
    OptimizationRecommendation, OptimizationResult, Orchestrator, Transformer,
};

const VULNERABLE: &str = "function run(src) {\n  return eval(src);\n}\n";
const BROKEN: &str = ")(\n)(\n)(\n)(\n";

/// Transformer that replaces the eval sink in every recommended file.
struct EvalRewriter;

impl Transformer for EvalRewriter {
    fn name(&self) -> &'static str {
        "eval-rewriter"
    }

    fn optimize(
        &self,
        _root: &Path,
        recommendations: &[OptimizationRecommendation],
    ) -> Result<OptimizationResult> {
        let files: BTreeSet<&str> = recommendations.iter().map(|r| r.file.as_str()).collect();
        let mut transformations = Vec::new();
        for file in files {
            let path = PathBuf::from(file);
            let original = fs::read_to_string(&path)?;
            let transformed = original.replace("eval(src)", "JSON.parse(src)");
            transformations.push(FileTransformation {
                path,
                original,
                transformed,
                applied_rules: vec!["dynamic-code-execution".into()],
            });
        }
        Ok(OptimizationResult {
            transformations,
            improvement_factor: 0.5,
        })
    }
}

/// Transformer that corrupts every recommended file.
struct Saboteur;

impl Transformer for Saboteur {
    fn name(&self) -> &'static str {
        "saboteur"
    }

    fn optimize(
        &self,
        _root: &Path,
        recommendations: &[OptimizationRecommendation],
    ) -> Result<OptimizationResult> {
        let files: BTreeSet<&str> = recommendations.iter().map(|r| r.file.as_str()).collect();
        let mut transformations = Vec::new();
        for file in files {
            let path = PathBuf::from(file);
            let original = fs::read_to_string(&path)?;
            transformations.push(FileTransformation {
                path,
                original,
                transformed: BROKEN.into(),
                applied_rules: vec!["dynamic-code-execution".into()],
            });
        }
        Ok(OptimizationResult {
            transformations,
            improvement_factor: 1.0,
        })
    }
}

fn run_cycle(
    config: Config,
    transformer: Box<dyn Transformer>,
    project: &Path,
    out: &Path,
) -> cip_core::Cycle {
    let engine = AnalysisEngine::new(config);
    let orchestrator = Orchestrator::new(engine, transformer, out);
    orchestrator.run(project).unwrap()
}

#[test]
fn clean_project_completes_with_artifacts() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(project.path().join("calc.js"), "const total = 1 + 2;\n").unwrap();

    let cycle = run_cycle(
        Config::default(),
        Box::new(NoopTransformer),
        project.path(),
        out.path(),
    );

    assert_eq!(cycle.status, CycleStatus::Completed);
    assert!(cycle.finished_at.is_some());
    assert!(cycle.errors.is_empty());
    // No issues, nothing transformed: quality 100 blended with the bare base
    // gives (50 + 100) / 2.
    assert_eq!(cycle.improvement_score, Some(75.0));
    let validation = cycle.validation.as_ref().unwrap();
    assert!(!validation.rollback_recommended);
    assert_eq!(validation.syntax_error_count, 0);

    let cycle_dir = out.path().join(&cycle.id);
    for artifact in [
        "analysis.json",
        "optimization.json",
        "validation.json",
        "report.json",
        "cycle.json",
    ] {
        assert!(
            cycle_dir.join(artifact).is_file(),
            "missing artifact {artifact}"
        );
    }
}

#[test]
fn failed_tests_roll_the_transformation_back() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let vuln = project.path().join("vuln.js");
    fs::write(&vuln, VULNERABLE).unwrap();

    let mut config = Config::default();
    config.pipeline.test_command = Some("echo '3 passed, 2 failed'".into());

    let cycle = run_cycle(config, Box::new(EvalRewriter), project.path(), out.path());

    assert_eq!(cycle.status, CycleStatus::RolledBack);
    assert!(!cycle.recommendations.is_empty());
    let validation = cycle.validation.as_ref().unwrap();
    assert_eq!(validation.tests_passed, 3);
    assert_eq!(validation.tests_failed, 2);
    assert_eq!(validation.syntax_error_count, 0);
    assert!(validation.rollback_recommended);
    assert_eq!(cycle.improvement_score, None);

    // Restored byte-for-byte.
    assert_eq!(fs::read_to_string(&vuln).unwrap(), VULNERABLE);

    // Pre-rollback artifacts stay on disk.
    let cycle_dir = out.path().join(&cycle.id);
    assert!(cycle_dir.join("analysis.json").is_file());
    assert!(cycle_dir.join("validation.json").is_file());
    assert!(cycle_dir.join("cycle.json").is_file());
}

#[test]
fn syntax_errors_roll_the_transformation_back() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let vuln = project.path().join("vuln.js");
    fs::write(&vuln, VULNERABLE).unwrap();

    let cycle = run_cycle(
        Config::default(),
        Box::new(Saboteur),
        project.path(),
        out.path(),
    );

    assert_eq!(cycle.status, CycleStatus::RolledBack);
    let validation = cycle.validation.as_ref().unwrap();
    assert_eq!(validation.syntax_error_count, 1);
    assert!(validation.rollback_recommended);
    assert_eq!(fs::read_to_string(&vuln).unwrap(), VULNERABLE);
}

#[test]
fn disabling_auto_rollback_keeps_the_candidate_and_fails_the_cycle() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let vuln = project.path().join("vuln.js");
    fs::write(&vuln, VULNERABLE).unwrap();

    let mut config = Config::default();
    config.pipeline.auto_rollback = false;

    let cycle = run_cycle(config, Box::new(Saboteur), project.path(), out.path());

    // A cycle whose validation still recommends rollback can never complete.
    assert_eq!(cycle.status, CycleStatus::Failed);
    assert!(!cycle.errors.is_empty());
    assert_eq!(fs::read_to_string(&vuln).unwrap(), BROKEN);
}

#[test]
fn accepted_transformation_completes_and_reports() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let vuln = project.path().join("vuln.js");
    fs::write(&vuln, VULNERABLE).unwrap();

    let mut config = Config::default();
    config.pipeline.formats = vec![
        cip_core::ReportFormat::Json,
        cip_core::ReportFormat::Markdown,
        cip_core::ReportFormat::Text,
    ];

    let cycle = run_cycle(config, Box::new(EvalRewriter), project.path(), out.path());

    assert_eq!(cycle.status, CycleStatus::Completed);
    let score = cycle.improvement_score.unwrap();
    assert!((0.0..=100.0).contains(&score), "score out of range: {score}");
    assert!(fs::read_to_string(&vuln).unwrap().contains("JSON.parse"));

    let cycle_dir = out.path().join(&cycle.id);
    assert!(cycle_dir.join("report.json").is_file());
    assert!(cycle_dir.join("report.md").is_file());
    assert!(cycle_dir.join("report.txt").is_file());

    let markdown = fs::read_to_string(cycle_dir.join("report.md")).unwrap();
    assert!(markdown.contains("completed"));
    assert!(markdown.contains("## Recommendations"));
}

#[test]
fn reports_are_deterministic_for_identical_cycles() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(project.path().join("calc.js"), "const total = 1 + 2;\n").unwrap();

    let mut config = Config::default();
    config.pipeline.formats = vec![cip_core::ReportFormat::Markdown];

    let cycle = run_cycle(
        config,
        Box::new(NoopTransformer),
        project.path(),
        out.path(),
    );
    let path = out.path().join(&cycle.id).join("report.md");
    let first = fs::read_to_string(&path).unwrap();
    let second = cip_core::report::render(&cycle, cip_core::ReportFormat::Markdown).unwrap();
    assert_eq!(first, second);
}
