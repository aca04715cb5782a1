//! Security rule analyzer.
//!
//! A fixed, ordered table of declarative rules. The tree is walked once; at
//! each node every rule whose minimum scan level is at or below the
//! configured level is evaluated, and a match emits an issue carrying the
//! rule's severity and suggestions.

use std::path::Path;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::RuleAnalyzer;
use crate::tree::{NodeKind, SyntaxNode, SyntaxTree};
use crate::{Dimension, Issue, Location, ScanLevel, Severity};

type RuleCheck = fn(&SyntaxNode, &SyntaxTree, &str) -> Option<String>;

/// One declarative security rule.
pub struct SecurityRule {
    pub id: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    pub level: ScanLevel,
    pub suggestions: &'static [&'static str],
    check: RuleCheck,
}

static EVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:eval|execScript|new\s+Function)\s*\(").expect("static regex"));

static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:password|passwd|secret|api[_-]?key|auth[_-]?token|private[_-]?key)\b\s*[:=]\s*["'][^"']{4,}["']"#)
        .expect("static regex")
});

static SQL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:select\s+.+\s+from|insert\s+into|update\s+\w+\s+set|delete\s+from)\b")
        .expect("static regex")
});

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(?:exec|execSync|spawn|spawnSync|popen|system|check_output)\s*\(|subprocess\.(?:run|call|Popen)\s*\()")
        .expect("static regex")
});

static LOG_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:console\.(?:log|info|warn|error)|print|println!|eprintln!|logger?\.\w+)\s*[!(]")
        .expect("static regex")
});

static WEAK_CRYPTO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:md5|sha-?1|\bdes\b|rc4)\b"#).expect("static regex")
});

// Nested quantifier over a quantified group, the classic catastrophic
// backtracking shape: (a+)+, (a*)+, ([a-z]+)*
static REDOS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*[+*][^)]*\)\s*[+*]").expect("static regex"));

static SENSITIVE_TOKENS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasickBuilder::new().ascii_case_insensitive(true).build([
        "password",
        "passwd",
        "secret",
        "api_key",
        "apikey",
        "auth_token",
        "access_token",
        "ssn",
        "credit_card",
    ])
});

/// The rule table, in evaluation order.
pub static SECURITY_RULES: &[SecurityRule] = &[
    SecurityRule {
        id: "dynamic-code-execution",
        title: "Dynamic code execution",
        severity: Severity::Critical,
        level: ScanLevel::Basic,
        suggestions: &[
            "Replace eval with explicit parsing or a dispatch table.",
            "Never pass user input to a code-evaluating sink.",
        ],
        check: check_dynamic_execution,
    },
    SecurityRule {
        id: "unsafe-dom-injection",
        title: "Unsafe DOM injection sink",
        severity: Severity::Error,
        level: ScanLevel::Basic,
        suggestions: &[
            "Use textContent or a sanitizer before writing to the DOM.",
        ],
        check: check_dom_injection,
    },
    SecurityRule {
        id: "hardcoded-credentials",
        title: "Hard-coded credential",
        severity: Severity::Critical,
        level: ScanLevel::Basic,
        suggestions: &[
            "Move the secret to an environment variable or secret store.",
            "Rotate the committed credential.",
        ],
        check: check_hardcoded_credentials,
    },
    SecurityRule {
        id: "plaintext-endpoint",
        title: "Plaintext network endpoint",
        severity: Severity::Warning,
        level: ScanLevel::Standard,
        suggestions: &["Use https:// for non-local endpoints."],
        check: check_plaintext_endpoint,
    },
    SecurityRule {
        id: "sql-string-concatenation",
        title: "String-concatenated query",
        severity: Severity::Error,
        level: ScanLevel::Standard,
        suggestions: &["Use parameterized queries or a query builder."],
        check: check_sql_concatenation,
    },
    SecurityRule {
        id: "unsafe-command-execution",
        title: "Unsafe command execution",
        severity: Severity::Error,
        level: ScanLevel::Standard,
        suggestions: &[
            "Pass arguments as a list rather than an interpolated string.",
            "Validate or allow-list anything that reaches the shell.",
        ],
        check: check_command_execution,
    },
    SecurityRule {
        id: "weak-cryptography",
        title: "Deprecated cryptographic primitive",
        severity: Severity::Warning,
        level: ScanLevel::Standard,
        suggestions: &["Use SHA-256 or stronger; use AES-GCM for encryption."],
        check: check_weak_crypto,
    },
    SecurityRule {
        id: "sensitive-data-logging",
        title: "Sensitive identifier logged",
        severity: Severity::Warning,
        level: ScanLevel::Thorough,
        suggestions: &["Redact secrets before logging."],
        check: check_sensitive_logging,
    },
    SecurityRule {
        id: "catastrophic-regex",
        title: "Catastrophic backtracking regex",
        severity: Severity::Warning,
        level: ScanLevel::Thorough,
        suggestions: &[
            "Remove nested quantifiers or use an atomic/possessive form.",
        ],
        check: check_catastrophic_regex,
    },
];

pub struct SecurityAnalyzer {
    level: ScanLevel,
}

impl SecurityAnalyzer {
    pub fn new(level: ScanLevel) -> Self {
        Self { level }
    }
}

impl RuleAnalyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn analyze_file(&self, path: &Path, text: &str, tree: &SyntaxTree) -> Result<Vec<Issue>> {
        let file = path.display().to_string();
        let mut issues = Vec::new();

        for node in tree.iter() {
            for rule in SECURITY_RULES.iter().filter(|r| r.level <= self.level) {
                if let Some(description) = (rule.check)(node, tree, text) {
                    issues.push(Issue {
                        id: rule.id.to_string(),
                        title: rule.title.to_string(),
                        description,
                        severity: rule.severity,
                        dimension: Dimension::Security,
                        file: file.clone(),
                        location: Location::new(node.line, node.column),
                        suggestions: rule.suggestions.iter().map(|s| s.to_string()).collect(),
                    });
                }
            }
        }

        Ok(issues)
    }
}

fn node_text<'a>(node: &SyntaxNode, source: &'a str) -> &'a str {
    source.get(node.start_byte..node.end_byte).unwrap_or("")
}

fn check_dynamic_execution(node: &SyntaxNode, _tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::Call {
        return None;
    }
    let text = node_text(node, source);
    if EVAL_RE.is_match(text) {
        Some(format!(
            "Dynamically evaluated code: `{}`.",
            first_line(text)
        ))
    } else {
        None
    }
}

fn check_dom_injection(node: &SyntaxNode, _tree: &SyntaxTree, source: &str) -> Option<String> {
    let interesting = node.raw_kind == "assignment_expression" || node.kind == NodeKind::Call;
    if !interesting {
        return None;
    }
    let text = node_text(node, source);
    let sink = if node.raw_kind == "assignment_expression"
        && (text.contains(".innerHTML") || text.contains(".outerHTML"))
    {
        "innerHTML/outerHTML assignment"
    } else if node.kind == NodeKind::Call
        && (text.starts_with("document.write") || text.contains(".insertAdjacentHTML("))
    {
        "document.write / insertAdjacentHTML"
    } else {
        return None;
    };
    Some(format!("Unsafe DOM sink ({sink}): `{}`.", first_line(text)))
}

fn check_hardcoded_credentials(
    node: &SyntaxNode,
    _tree: &SyntaxTree,
    source: &str,
) -> Option<String> {
    // Checked at declarator level so one secret yields one issue, not one
    // per enclosing expression.
    if !matches!(
        node.raw_kind,
        "variable_declarator" | "assignment_expression" | "assignment" | "pair"
            | "let_declaration" | "const_item" | "static_item"
    ) {
        return None;
    }
    let text = node_text(node, source);
    if CREDENTIAL_RE.is_match(text) {
        Some("Credential-shaped literal assigned to a sensitively named binding.".into())
    } else {
        None
    }
}

fn check_plaintext_endpoint(node: &SyntaxNode, tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::StringLiteral {
        return None;
    }
    // string_fragment duplicates its parent string's text; skip it.
    if tree
        .parent(node.id)
        .map_or(false, |p| p.kind == NodeKind::StringLiteral)
    {
        return None;
    }
    let text = node_text(node, source);
    if text.contains("http://")
        && !text.contains("http://localhost")
        && !text.contains("http://127.0.0.1")
    {
        Some(format!("Plaintext endpoint {}.", first_line(text)))
    } else {
        None
    }
}

fn check_sql_concatenation(node: &SyntaxNode, tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::StringLiteral {
        return None;
    }
    let parent = tree.parent(node.id)?;
    if parent.kind == NodeKind::StringLiteral {
        return None;
    }
    if !matches!(parent.raw_kind, "binary_expression" | "binary_operator" | "augmented_assignment_expression") {
        return None;
    }
    let parent_text = node_text(parent, source);
    if SQL_RE.is_match(node_text(node, source)) && parent_text.contains('+') {
        Some("Query assembled by string concatenation.".into())
    } else {
        None
    }
}

fn check_command_execution(node: &SyntaxNode, tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::Call {
        return None;
    }
    let text = node_text(node, source);
    if !COMMAND_RE.is_match(text) {
        return None;
    }
    // Literal-only argument lists are left alone; variable content is the
    // injection vector.
    let args = tree
        .children(node.id)
        .find(|c| matches!(c.raw_kind, "arguments" | "argument_list"))?;
    let has_variable_arg = tree.children(args.id).any(|arg| match arg.raw_kind {
        "identifier" | "member_expression" | "attribute" | "subscript" | "subscript_expression"
        | "binary_expression" | "binary_operator" | "call_expression" | "call" => true,
        "template_string" => node_text(arg, source).contains("${"),
        _ => false,
    });
    if has_variable_arg {
        Some(format!(
            "Command executed with variable arguments: `{}`.",
            first_line(text)
        ))
    } else {
        None
    }
}

fn check_weak_crypto(node: &SyntaxNode, _tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::Call {
        return None;
    }
    let text = node_text(node, source);
    let head = first_line(text);
    if WEAK_CRYPTO_RE.is_match(head) {
        Some(format!("Deprecated primitive referenced in `{head}`."))
    } else {
        None
    }
}

fn check_sensitive_logging(node: &SyntaxNode, _tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::Call {
        return None;
    }
    let text = node_text(node, source);
    if LOG_CALL_RE.is_match(text) && SENSITIVE_TOKENS.is_match(text) {
        Some("Log statement references a sensitively named identifier.".into())
    } else {
        None
    }
}

fn check_catastrophic_regex(node: &SyntaxNode, _tree: &SyntaxTree, source: &str) -> Option<String> {
    if node.kind != NodeKind::RegexLiteral {
        return None;
    }
    let text = node_text(node, source);
    if REDOS_RE.is_match(text) {
        Some(format!(
            "Regex `{}` nests a quantifier inside a quantified group.",
            first_line(text)
        ))
    } else {
        None
    }
}

fn first_line(text: &str) -> &str {
    let line = text.lines().next().unwrap_or(text);
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
