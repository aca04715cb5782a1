//! Validation/rollback subsystem.
//!
//! Re-parses every transformed file for syntax errors, optionally runs the
//! project's test suite and a performance-regression check, and recommends
//! whether the transformation should be rolled back.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tree;
use crate::Severity;

/// Test tallies from the test-runner collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs the project's test suite. Absence of a configured command is not an
/// error; it yields zero counts.
pub trait TestRunner: Send + Sync {
    fn run(&self, root: &Path) -> Result<TestCounts>;
}

/// No configured test command.
pub struct NoTests;

impl TestRunner for NoTests {
    fn run(&self, _root: &Path) -> Result<TestCounts> {
        Ok(TestCounts::default())
    }
}

static PASSED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+passed").expect("static regex"));
static FAILED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+failed").expect("static regex"));
static SKIPPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(?:skipped|ignored)").expect("static regex"));

/// Shell-command test runner. Parses `N passed` / `N failed` / `N skipped`
/// tallies out of the combined output; a non-zero exit with no parsable
/// tally counts as one failed test.
pub struct CommandTestRunner {
    command: String,
}

impl CommandTestRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl TestRunner for CommandTestRunner {
    fn run(&self, root: &Path) -> Result<TestCounts> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(root)
            .output()
            .with_context(|| format!("running test command `{}`", self.command))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let grab = |re: &Regex| {
            re.captures_iter(&combined)
                .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok())
                .sum::<usize>()
        };
        let mut counts = TestCounts {
            passed: grab(&PASSED_RE),
            failed: grab(&FAILED_RE),
            skipped: grab(&SKIPPED_RE),
        };
        if !output.status.success() && counts.failed == 0 && counts.passed == 0 {
            counts.failed = 1;
        }
        Ok(counts)
    }
}

/// Optional performance-regression collaborator; returns the regression
/// count.
pub trait RegressionCheck: Send + Sync {
    fn run(&self, root: &Path) -> Result<usize>;
}

/// One finding recorded during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
}

/// Outcome of validating a transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub syntax_error_count: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub tests_skipped: usize,
    pub performance_regressions: usize,
    pub quality_score: f32,
    pub quality_delta: Option<f32>,
    pub rollback_recommended: bool,
    pub issues: Vec<ValidationIssue>,
}

/// Validates transformed files and decides whether to recommend rollback.
pub struct Validator {
    test_runner: Box<dyn TestRunner>,
    regression_check: Option<Box<dyn RegressionCheck>>,
    max_performance_regressions: usize,
}

impl Validator {
    pub fn new(test_runner: Box<dyn TestRunner>, max_performance_regressions: usize) -> Self {
        Self {
            test_runner,
            regression_check: None,
            max_performance_regressions,
        }
    }

    pub fn with_regression_check(mut self, check: Box<dyn RegressionCheck>) -> Self {
        self.regression_check = Some(check);
        self
    }

    /// Validate the transformed files in `files` under `root`.
    /// `baseline_score` is the pre-transformation overall quality score;
    /// when present, the result carries the delta against it.
    pub fn validate(
        &self,
        root: &Path,
        files: &[PathBuf],
        baseline_score: Option<f32>,
    ) -> Result<ValidationResult> {
        let mut issues = Vec::new();
        let mut syntax_error_count = 0usize;

        for path in files {
            let display = path.display().to_string();
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    syntax_error_count += 1;
                    issues.push(ValidationIssue {
                        severity: Severity::Critical,
                        message: format!("transformed file unreadable: {err}"),
                        file: Some(display),
                    });
                    continue;
                }
            };
            if let Err(failure) = tree::parse(path, &text) {
                syntax_error_count += 1;
                issues.push(ValidationIssue {
                    severity: Severity::Critical,
                    message: format!("syntax error after transformation: {failure}"),
                    file: Some(display),
                });
            }
        }

        let tests = self.test_runner.run(root).unwrap_or_else(|err| {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!("test runner failed: {err}"),
                file: None,
            });
            TestCounts {
                failed: 1,
                ..TestCounts::default()
            }
        });
        if tests.failed > 0 {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!("{} test(s) failed after transformation", tests.failed),
                file: None,
            });
        }

        let performance_regressions = match &self.regression_check {
            Some(check) => check.run(root).unwrap_or_else(|err| {
                issues.push(ValidationIssue {
                    severity: Severity::Warning,
                    message: format!("regression check failed: {err}"),
                    file: None,
                });
                0
            }),
            None => 0,
        };

        let quality_score = quality_score(syntax_error_count, &tests, performance_regressions);
        let rollback_recommended = syntax_error_count > 0
            || tests.failed > 0
            || performance_regressions > self.max_performance_regressions;

        Ok(ValidationResult {
            syntax_error_count,
            tests_passed: tests.passed,
            tests_failed: tests.failed,
            tests_skipped: tests.skipped,
            performance_regressions,
            quality_score,
            quality_delta: baseline_score.map(|baseline| quality_score - baseline),
            rollback_recommended,
            issues,
        })
    }
}

/// Severity-weighted subtraction, same pattern as the metric scores:
/// each syntax error costs a Critical, each failed test an Error, each
/// regression a Warning.
fn quality_score(syntax_errors: usize, tests: &TestCounts, regressions: usize) -> f32 {
    let mut score = 100.0f32;
    score -= syntax_errors as f32 * Severity::Critical.weight() as f32 * 5.0;
    score -= tests.failed as f32 * Severity::Error.weight() as f32 * 5.0;
    score -= regressions as f32 * Severity::Warning.weight() as f32 * 5.0;
    score.clamp(0.0, 100.0)
}
