//! Complexity rule analyzer.
//!
//! Walks the tree once per function-like node and computes cyclomatic
//! complexity, cognitive complexity, maximum nesting depth, parameter count,
//! and line span, each checked against a warning/error threshold pair.
//! File-level size caps (total lines, function count, class count) are
//! checked separately.

use std::path::Path;

use anyhow::Result;

use crate::engine::RuleAnalyzer;
use crate::tree::{function_name, NodeId, NodeKind, SyntaxTree};
use crate::{ComplexityThresholds, Dimension, FileCaps, Issue, Location, Severity};

/// Metrics for one function-like node.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionMetrics {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub max_nesting: u32,
    pub parameters: u32,
    pub line_span: u32,
}

pub struct ComplexityAnalyzer {
    thresholds: ComplexityThresholds,
    caps: FileCaps,
}

impl ComplexityAnalyzer {
    pub fn new(thresholds: ComplexityThresholds, caps: FileCaps) -> Self {
        Self { thresholds, caps }
    }
}

impl RuleAnalyzer for ComplexityAnalyzer {
    fn name(&self) -> &'static str {
        "complexity"
    }

    fn analyze_file(&self, path: &Path, text: &str, tree: &SyntaxTree) -> Result<Vec<Issue>> {
        let file = path.display().to_string();
        let mut issues = Vec::new();

        for node in tree.iter() {
            if !node.kind.is_function_like() {
                continue;
            }
            let metrics = measure_function(tree, node.id);
            let name = function_name(tree, node.id, text);
            let location = Location::with_end(node.line, node.column, node.end_line);
            push_metric_issue(
                &mut issues,
                self.thresholds.cyclomatic.classify(metrics.cyclomatic),
                "high-cyclomatic-complexity",
                format!("High cyclomatic complexity in `{name}`"),
                format!(
                    "`{name}` has cyclomatic complexity {} (warning at {}, error at {}).",
                    metrics.cyclomatic,
                    self.thresholds.cyclomatic.warning,
                    self.thresholds.cyclomatic.error
                ),
                &file,
                &location,
                vec![
                    "Extract branches into smaller functions.".into(),
                    "Replace condition chains with lookup tables or early returns.".into(),
                ],
            );
            push_metric_issue(
                &mut issues,
                self.thresholds.cognitive.classify(metrics.cognitive),
                "high-cognitive-complexity",
                format!("High cognitive complexity in `{name}`"),
                format!(
                    "`{name}` has cognitive complexity {} (warning at {}, error at {}).",
                    metrics.cognitive,
                    self.thresholds.cognitive.warning,
                    self.thresholds.cognitive.error
                ),
                &file,
                &location,
                vec!["Flatten nested control flow with guard clauses.".into()],
            );
            push_metric_issue(
                &mut issues,
                self.thresholds.nesting.classify(metrics.max_nesting),
                "deep-nesting",
                format!("Deeply nested control flow in `{name}`"),
                format!(
                    "`{name}` nests control structures {} levels deep (warning at {}).",
                    metrics.max_nesting, self.thresholds.nesting.warning
                ),
                &file,
                &location,
                vec!["Invert conditions and return early.".into()],
            );
            push_metric_issue(
                &mut issues,
                self.thresholds.parameters.classify(metrics.parameters),
                "too-many-parameters",
                format!("Long parameter list in `{name}`"),
                format!(
                    "`{name}` takes {} parameters (warning at {}).",
                    metrics.parameters, self.thresholds.parameters.warning
                ),
                &file,
                &location,
                vec!["Group related parameters into a struct or options object.".into()],
            );
            push_metric_issue(
                &mut issues,
                self.thresholds.function_lines.classify(metrics.line_span),
                "long-function",
                format!("Long function `{name}`"),
                format!(
                    "`{name}` spans {} lines (warning at {}).",
                    metrics.line_span, self.thresholds.function_lines.warning
                ),
                &file,
                &location,
                vec!["Split the function along its logical phases.".into()],
            );
        }

        self.check_file_caps(&file, text, tree, &mut issues);
        Ok(issues)
    }
}

impl ComplexityAnalyzer {
    fn check_file_caps(
        &self,
        file: &str,
        text: &str,
        tree: &SyntaxTree,
        issues: &mut Vec<Issue>,
    ) {
        let lines = text.lines().count();
        if lines > self.caps.max_lines {
            let severity = if lines >= self.caps.max_lines * 2 {
                Severity::Error
            } else {
                Severity::Warning
            };
            issues.push(Issue {
                id: "file-too-large".into(),
                title: "File too large".into(),
                description: format!(
                    "File has {} lines; the cap is {}.",
                    lines, self.caps.max_lines
                ),
                severity,
                dimension: Dimension::Maintainability,
                file: file.to_string(),
                location: Location::new(1, 1),
                suggestions: vec!["Split the file along module boundaries.".into()],
            });
        }

        let functions = tree.function_count();
        if functions > self.caps.max_functions {
            let severity = if functions * 2 >= self.caps.max_functions * 3 {
                Severity::Error
            } else {
                Severity::Warning
            };
            issues.push(Issue {
                id: "too-many-functions".into(),
                title: "Too many functions in one file".into(),
                description: format!(
                    "File defines {} functions; the cap is {}.",
                    functions, self.caps.max_functions
                ),
                severity,
                dimension: Dimension::Maintainability,
                file: file.to_string(),
                location: Location::new(1, 1),
                suggestions: vec!["Move related functions into their own module.".into()],
            });
        }

        let classes = tree.class_count();
        if classes > self.caps.max_classes {
            let severity = if classes >= self.caps.max_classes * 2 {
                Severity::Error
            } else {
                Severity::Warning
            };
            issues.push(Issue {
                id: "too-many-classes".into(),
                title: "Too many classes in one file".into(),
                description: format!(
                    "File defines {} classes; the cap is {}.",
                    classes, self.caps.max_classes
                ),
                severity,
                dimension: Dimension::Maintainability,
                file: file.to_string(),
                location: Location::new(1, 1),
                suggestions: vec!["Give each class its own file.".into()],
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn push_metric_issue(
    issues: &mut Vec<Issue>,
    severity: Option<Severity>,
    id: &str,
    title: String,
    description: String,
    file: &str,
    location: &Location,
    suggestions: Vec<String>,
) {
    if let Some(severity) = severity {
        issues.push(Issue {
            id: id.to_string(),
            title,
            description,
            severity,
            dimension: Dimension::Complexity,
            file: file.to_string(),
            location: location.clone(),
            suggestions,
        });
    }
}

/// Compute all per-function metrics in one subtree walk. Nested function
/// bodies keep their own scope and are not descended into.
pub fn measure_function(tree: &SyntaxTree, function: NodeId) -> FunctionMetrics {
    let node = tree.node(function);
    let mut metrics = FunctionMetrics {
        cyclomatic: 1,
        line_span: (node.end_line - node.line + 1) as u32,
        ..FunctionMetrics::default()
    };
    walk(tree, function, 0, &mut metrics);
    metrics
}

fn walk(tree: &SyntaxTree, id: NodeId, depth: u32, metrics: &mut FunctionMetrics) {
    for &child in &tree.node(id).children {
        let node = tree.node(child);
        if node.kind.is_function_like() {
            continue;
        }
        if node.kind == NodeKind::Parameter {
            metrics.parameters += 1;
        }
        if node.kind.is_branching() {
            metrics.cyclomatic += 1;
            metrics.cognitive += 1 + depth;
            if depth + 1 > metrics.max_nesting {
                metrics.max_nesting = depth + 1;
            }
            walk(tree, child, depth + 1, metrics);
            continue;
        }
        if node.kind.is_logical_op() {
            metrics.cyclomatic += 1;
            metrics.cognitive += 1 + depth;
        }
        walk(tree, child, depth, metrics);
    }
}
