//! Structural-pattern analyzer.
//!
//! Detects anti-patterns by tree shape rather than single-node predicates:
//! callback pyramids, empty exception handlers, and statement-heavy method
//! bodies.

use std::path::Path;

use anyhow::Result;

use crate::engine::RuleAnalyzer;
use crate::tree::{function_name, NodeId, NodeKind, SyntaxTree};
use crate::{Dimension, Issue, Location, Severity};

const CALLBACK_PYRAMID_DEPTH: u32 = 3;
const MAX_BODY_STATEMENTS: usize = 30;

pub struct PatternAnalyzer;

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleAnalyzer for PatternAnalyzer {
    fn name(&self) -> &'static str {
        "patterns"
    }

    fn analyze_file(&self, path: &Path, text: &str, tree: &SyntaxTree) -> Result<Vec<Issue>> {
        let file = path.display().to_string();
        let mut issues = Vec::new();

        for node in tree.iter() {
            if node.kind.is_function_like() {
                let depth = callback_depth(tree, node.id);
                if depth >= CALLBACK_PYRAMID_DEPTH {
                    issues.push(Issue {
                        id: "callback-pyramid".into(),
                        title: "Callback pyramid".into(),
                        description: format!(
                            "Callback nested {} levels deep inside call arguments.",
                            depth
                        ),
                        severity: Severity::Warning,
                        dimension: Dimension::Maintainability,
                        file: file.clone(),
                        location: Location::new(node.line, node.column),
                        suggestions: vec![
                            "Flatten the chain with promises/async or named functions.".into(),
                        ],
                    });
                }

                let statements = body_statement_count(tree, node.id);
                if statements > MAX_BODY_STATEMENTS {
                    let name = function_name(tree, node.id, text);
                    issues.push(Issue {
                        id: "statement-heavy-function".into(),
                        title: format!("Statement-heavy function `{name}`"),
                        description: format!(
                            "`{name}` has {} top-level statements in its body (cap {}).",
                            statements, MAX_BODY_STATEMENTS
                        ),
                        severity: Severity::Warning,
                        dimension: Dimension::Maintainability,
                        file: file.clone(),
                        location: Location::with_end(node.line, node.column, node.end_line),
                        suggestions: vec![
                            "Extract cohesive statement runs into helpers.".into(),
                        ],
                    });
                }
            }

            if node.kind == NodeKind::Catch && handler_is_empty(tree, node.id) {
                issues.push(Issue {
                    id: "empty-exception-handler".into(),
                    title: "Empty exception handler".into(),
                    description: "Caught exception is silently discarded.".into(),
                    severity: Severity::Warning,
                    dimension: Dimension::Maintainability,
                    file: file.clone(),
                    location: Location::new(node.line, node.column),
                    suggestions: vec![
                        "Log, rethrow, or handle the error explicitly.".into(),
                    ],
                });
            }
        }

        Ok(issues)
    }
}

/// Number of enclosing function-like scopes reached by crossing a call
/// boundary on the way up, counting this function itself when it sits in
/// call arguments. Three or more is a pyramid.
fn callback_depth(tree: &SyntaxTree, id: NodeId) -> u32 {
    let mut depth = 0u32;
    let mut saw_call = false;
    let mut cursor = tree.node(id).parent;
    while let Some(pid) = cursor {
        let node = tree.node(pid);
        if node.kind == NodeKind::Call {
            saw_call = true;
        } else if node.kind.is_function_like() {
            if !saw_call {
                break;
            }
            depth += 1;
            saw_call = false;
        }
        cursor = node.parent;
    }
    if depth > 0 {
        // count the innermost callback itself
        depth + 1
    } else {
        0
    }
}

fn body_block(tree: &SyntaxTree, function: NodeId) -> Option<NodeId> {
    tree.children(function)
        .find(|c| matches!(c.raw_kind, "statement_block" | "block" | "body"))
        .map(|c| c.id)
}

fn body_statement_count(tree: &SyntaxTree, function: NodeId) -> usize {
    match body_block(tree, function) {
        Some(body) => tree
            .children(body)
            .filter(|c| {
                c.raw_kind.ends_with("statement")
                    || c.raw_kind.ends_with("declaration")
                    || c.raw_kind.ends_with("definition")
            })
            .count(),
        None => 0,
    }
}

fn handler_is_empty(tree: &SyntaxTree, catch: NodeId) -> bool {
    let Some(body) = body_block(tree, catch) else {
        return false;
    };
    tree.children(body).all(|c| {
        c.kind == NodeKind::Comment
            || c.raw_kind == "pass_statement"
            || !c.raw_kind.chars().any(|ch| ch.is_ascii_alphabetic())
    })
}
