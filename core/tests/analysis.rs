use std::collections::BTreeMap;
use std::path::Path;

use cip_core::complexity::ComplexityAnalyzer;
use cip_core::patterns::PatternAnalyzer;
use cip_core::security::SecurityAnalyzer;
use cip_core::{
    metrics, tree, AnalysisEngine, ComplexityThresholds, Config, Dimension, FileCaps, Issue,
    Location, RuleAnalyzer, ScanLevel, Severity, SyntaxTree,
};

fn parse(name: &str, source: &str) -> SyntaxTree {
    tree::parse(Path::new(name), source).expect("parse")
}

fn complexity_issues(name: &str, source: &str) -> Vec<Issue> {
    let tree = parse(name, source);
    ComplexityAnalyzer::new(ComplexityThresholds::default(), FileCaps::default())
        .analyze_file(Path::new(name), source, &tree)
        .unwrap()
}

fn security_issues(level: ScanLevel, name: &str, source: &str) -> Vec<Issue> {
    let tree = parse(name, source);
    SecurityAnalyzer::new(level)
        .analyze_file(Path::new(name), source, &tree)
        .unwrap()
}

fn pattern_issues(name: &str, source: &str) -> Vec<Issue> {
    let tree = parse(name, source);
    PatternAnalyzer::new()
        .analyze_file(Path::new(name), source, &tree)
        .unwrap()
}

fn assert_has(issues: &[Issue], id: &str) {
    assert!(
        issues.iter().any(|i| i.id == id),
        "expected issue `{id}`, got: {:?}",
        issues.iter().map(|i| i.id.as_str()).collect::<Vec<_>>()
    );
}

fn assert_not(issues: &[Issue], id: &str) {
    assert!(
        !issues.iter().any(|i| i.id == id),
        "did not expect issue `{id}`"
    );
}

fn branchy_function(branches: usize) -> String {
    let mut source = String::from("function router(x) {\n");
    for i in 0..branches {
        source.push_str(&format!("  if (x === {i}) {{ return {i}; }}\n"));
    }
    source.push_str("  return -1;\n}\n");
    source
}

#[test]
fn cyclomatic_complexity_counts_branches_and_short_circuits() {
    // 4 ifs + one `&&` = complexity 6, well under the warning threshold.
    let source = "function gate(a, b) {\n  if (a) { return 1; }\n  if (b) { return 2; }\n  if (a > b) { return 3; }\n  if (a < b) { return 4; }\n  return a && b;\n}\n";
    let issues = complexity_issues("gate.js", source);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[test]
fn cyclomatic_warning_at_threshold() {
    // 10 ifs -> complexity 11 -> warning, not error.
    let issues = complexity_issues("router.js", &branchy_function(10));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "high-cyclomatic-complexity");
    assert_eq!(issues[0].severity, Severity::Warning);
    assert!(issues[0].description.contains("complexity 11"));
    assert_eq!(issues[0].dimension, Dimension::Complexity);
}

#[test]
fn cyclomatic_error_at_double_threshold() {
    // 19 ifs -> complexity 20 -> error.
    let issues = complexity_issues("router.js", &branchy_function(19));
    let cyclomatic = issues
        .iter()
        .find(|i| i.id == "high-cyclomatic-complexity")
        .expect("cyclomatic issue");
    assert_eq!(cyclomatic.severity, Severity::Error);
}

#[test]
fn nested_functions_keep_their_own_complexity_scope() {
    let mut source = String::from("function outer() {\n  function inner(x) {\n");
    for i in 0..10 {
        source.push_str(&format!("    if (x === {i}) {{ return {i}; }}\n"));
    }
    source.push_str("    return -1;\n  }\n  return inner;\n}\n");

    let issues = complexity_issues("nested.js", &source);
    let cyclomatic: Vec<_> = issues
        .iter()
        .filter(|i| i.id == "high-cyclomatic-complexity")
        .collect();
    // Only the inner function crosses the threshold; the outer one does not
    // inherit its branches.
    assert_eq!(cyclomatic.len(), 1);
    assert!(cyclomatic[0].description.contains("`inner`"));
}

#[test]
fn deep_nesting_is_flagged() {
    let source = "function nest(a) {\n  if (a > 0) {\n    if (a > 1) {\n      if (a > 2) {\n        if (a > 3) {\n          return 4;\n        }\n      }\n    }\n  }\n  return 0;\n}\n";
    let issues = complexity_issues("nest.js", source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "deep-nesting");
    assert_eq!(issues[0].severity, Severity::Warning);
}

#[test]
fn cognitive_complexity_grows_with_nesting() {
    // 5 nested ifs: cognitive 1+2+3+4+5 = 15, at the warning threshold.
    let source = "function nest(a) {\n  if (a > 0) {\n    if (a > 1) {\n      if (a > 2) {\n        if (a > 3) {\n          if (a > 4) {\n            return 5;\n          }\n        }\n      }\n    }\n  }\n  return 0;\n}\n";
    let issues = complexity_issues("nest.js", source);
    assert_has(&issues, "high-cognitive-complexity");
    assert_has(&issues, "deep-nesting");
}

#[test]
fn long_parameter_lists_are_flagged() {
    let source = "function wide(a, b, c, d, e, f) {\n  return a;\n}\n";
    let issues = complexity_issues("wide.js", source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "too-many-parameters");
    assert_eq!(issues[0].severity, Severity::Warning);
}

#[test]
fn long_functions_are_flagged() {
    let mut source = String::from("function long() {\n");
    for i in 0..55 {
        source.push_str(&format!("  a{i} = {i};\n"));
    }
    source.push_str("}\n");
    let issues = complexity_issues("long.js", &source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "long-function");
}

#[test]
fn file_line_cap_warns_then_escalates() {
    let warn_source: String = (0..600).map(|i| format!("x{i} = {i};\n")).collect();
    let issues = complexity_issues("big.js", &warn_source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "file-too-large");
    assert_eq!(issues[0].severity, Severity::Warning);

    let error_source: String = (0..1200).map(|i| format!("x{i} = {i};\n")).collect();
    let issues = complexity_issues("huge.js", &error_source);
    assert_eq!(issues[0].id, "file-too-large");
    assert_eq!(issues[0].severity, Severity::Error);
}

#[test]
fn function_and_class_caps_are_enforced() {
    let functions: String = (0..21)
        .map(|i| format!("function f{i}() {{ return {i}; }}\n"))
        .collect();
    let issues = complexity_issues("many_fns.js", &functions);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "too-many-functions");
    assert_eq!(issues[0].severity, Severity::Warning);

    let classes: String = (0..4).map(|i| format!("class C{i} {{}}\n")).collect();
    let issues = complexity_issues("many_classes.js", &classes);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "too-many-classes");
    assert_eq!(issues[0].severity, Severity::Warning);
}

#[test]
fn python_branching_and_boolean_operators_parse() {
    let source = "def choose(x):\n    if x > 0 and x < 10:\n        return 1\n    elif x > 10:\n        return 2\n    return 0\n";
    let issues = complexity_issues("choose.py", source);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[test]
fn rust_match_arms_parse_as_branches() {
    let source = "fn size(n: u32) -> &'static str {\n    match n {\n        0 => \"zero\",\n        1..=9 => \"small\",\n        _ => \"big\",\n    }\n}\n";
    let issues = complexity_issues("size.rs", source);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

const LEVELED_SOURCE: &str = "function run(src) {\n  return eval(src);\n}\n\nfunction digest(value) {\n  return crypto.createHash(\"md5\").update(value);\n}\n\nfunction audit(password) {\n  console.log(\"password accepted\", password);\n}\n";

#[test]
fn basic_scan_level_runs_only_basic_rules() {
    let issues = security_issues(ScanLevel::Basic, "app.js", LEVELED_SOURCE);
    assert_has(&issues, "dynamic-code-execution");
    assert_not(&issues, "weak-cryptography");
    assert_not(&issues, "sensitive-data-logging");
}

#[test]
fn standard_scan_level_adds_standard_rules() {
    let issues = security_issues(ScanLevel::Standard, "app.js", LEVELED_SOURCE);
    assert_has(&issues, "dynamic-code-execution");
    assert_has(&issues, "weak-cryptography");
    assert_not(&issues, "sensitive-data-logging");
}

#[test]
fn thorough_scan_level_runs_everything() {
    let issues = security_issues(ScanLevel::Thorough, "app.js", LEVELED_SOURCE);
    assert_has(&issues, "dynamic-code-execution");
    assert_has(&issues, "weak-cryptography");
    assert_has(&issues, "sensitive-data-logging");
}

#[test]
fn eval_is_critical() {
    let issues = security_issues(ScanLevel::Basic, "run.js", "function run(s) {\n  return eval(s);\n}\n");
    let issue = issues
        .iter()
        .find(|i| i.id == "dynamic-code-execution")
        .expect("eval issue");
    assert_eq!(issue.severity, Severity::Critical);
    assert_eq!(issue.dimension, Dimension::Security);
    assert_eq!(issue.location.line, 2);
}

#[test]
fn hardcoded_credentials_are_detected_once() {
    let source = "const apiKey = \"sk-123456789\";\n";
    let issues = security_issues(ScanLevel::Basic, "config.js", source);
    let hits: Vec<_> = issues
        .iter()
        .filter(|i| i.id == "hardcoded-credentials")
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].severity, Severity::Critical);
}

#[test]
fn plaintext_endpoint_skips_localhost() {
    let issues = security_issues(
        ScanLevel::Standard,
        "net.js",
        "const remote = \"http://example.com/api\";\nconst local = \"http://localhost:8080\";\n",
    );
    let hits: Vec<_> = issues
        .iter()
        .filter(|i| i.id == "plaintext-endpoint")
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].location.line, 1);
}

#[test]
fn sql_concatenation_is_detected() {
    let source = "const q = \"SELECT name FROM users WHERE id = \" + userId;\n";
    let issues = security_issues(ScanLevel::Standard, "db.js", source);
    assert_has(&issues, "sql-string-concatenation");
}

#[test]
fn command_execution_with_literal_args_is_tolerated() {
    let vulnerable = "exec(\"rm -rf \" + target);\n";
    let issues = security_issues(ScanLevel::Standard, "sh.js", vulnerable);
    assert_has(&issues, "unsafe-command-execution");

    let literal = "execSync(\"ls\");\n";
    let issues = security_issues(ScanLevel::Standard, "sh.js", literal);
    assert_not(&issues, "unsafe-command-execution");
}

#[test]
fn nested_quantifier_regex_is_flagged() {
    let issues = security_issues(
        ScanLevel::Thorough,
        "re.js",
        "const matcher = /(a+)+b/;\n",
    );
    assert_has(&issues, "catastrophic-regex");
}

#[test]
fn callback_pyramid_is_detected() {
    let source = "function load(cb) {\n  a(function (x) {\n    b(function (y) {\n      c(function (z) {\n        cb(x + y + z);\n      });\n    });\n  });\n}\n";
    let issues = pattern_issues("load.js", source);
    assert_has(&issues, "callback-pyramid");
}

#[test]
fn empty_catch_is_flagged_and_handled_catch_is_not() {
    let empty = "function risky(fn) {\n  try {\n    fn();\n  } catch (err) {\n  }\n}\n";
    let issues = pattern_issues("risky.js", empty);
    assert_has(&issues, "empty-exception-handler");

    let handled = "function risky(fn) {\n  try {\n    fn();\n  } catch (err) {\n    console.error(err);\n  }\n}\n";
    let issues = pattern_issues("risky.js", handled);
    assert_not(&issues, "empty-exception-handler");
}

#[test]
fn python_bare_pass_handler_is_flagged() {
    let source = "def load(path):\n    try:\n        return open(path).read()\n    except Exception:\n        pass\n";
    let issues = pattern_issues("load.py", source);
    assert_has(&issues, "empty-exception-handler");
}

#[test]
fn statement_heavy_function_is_flagged() {
    let mut source = String::from("function heavy() {\n");
    for i in 0..31 {
        source.push_str(&format!("  a{i} = {i};\n"));
    }
    source.push_str("}\n");
    let issues = pattern_issues("heavy.js", &source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "statement-heavy-function");
}

fn stub_issue(severity: Severity, dimension: Dimension) -> Issue {
    Issue {
        id: "stub".into(),
        title: "Stub".into(),
        description: String::new(),
        severity,
        dimension,
        file: "f.js".into(),
        location: Location::new(1, 1),
        suggestions: Vec::new(),
    }
}

#[test]
fn dimension_scores_subtract_by_severity_weight() {
    let issues = vec![
        stub_issue(Severity::Warning, Dimension::Security),
        stub_issue(Severity::Warning, Dimension::Security),
        stub_issue(Severity::Error, Dimension::Security),
    ];
    let scores = metrics::dimension_scores(&issues, "");
    // 100 - 5 - 5 - 15
    assert_eq!(scores[&Dimension::Security], 75.0);
}

#[test]
fn dimension_score_clamps_at_zero() {
    let issues: Vec<Issue> = (0..30)
        .map(|_| stub_issue(Severity::Critical, Dimension::Security))
        .collect();
    let scores = metrics::dimension_scores(&issues, "");
    assert_eq!(scores[&Dimension::Security], 0.0);
}

#[test]
fn info_issues_do_not_reduce_scores() {
    let issues = vec![stub_issue(Severity::Info, Dimension::Performance)];
    let scores = metrics::dimension_scores(&issues, "");
    assert_eq!(scores[&Dimension::Performance], 100.0);
    assert_eq!(metrics::overall_score(&scores), 100.0);
}

#[test]
fn overall_score_is_a_weighted_mean_over_present_dimensions() {
    let mut scores: BTreeMap<Dimension, f32> = BTreeMap::new();
    scores.insert(Dimension::Security, 50.0);
    scores.insert(Dimension::Complexity, 100.0);
    // (50*0.25 + 100*0.15) / 0.40
    let overall = metrics::overall_score(&scores);
    assert!((overall - 68.75).abs() < 0.01, "got {overall}");

    assert_eq!(metrics::overall_score(&BTreeMap::new()), 100.0);
}

#[test]
fn documentation_score_rewards_doc_comments() {
    let documented = "/// Adds numbers.\nfn add() {}\n";
    assert_eq!(metrics::documentation_score(documented), Some(100.0));

    let no_declarations = "const x = 1;\n";
    assert_eq!(metrics::documentation_score(no_declarations), None);
}

#[test]
fn recommendations_rank_by_severity_then_dimension_priority() {
    let mut issues = vec![
        stub_issue(Severity::Info, Dimension::Security),
        stub_issue(Severity::Warning, Dimension::Maintainability),
        stub_issue(Severity::Error, Dimension::Complexity),
        stub_issue(Severity::Critical, Dimension::Security),
    ];
    issues[1].location = Location::new(10, 1);

    let recommendations = metrics::rank_recommendations(&issues, 2);
    assert_eq!(recommendations.len(), 2);
    assert_eq!(recommendations[0].priority, 1);
    assert_eq!(recommendations[0].optimization_type, Dimension::Security);
    assert_eq!(recommendations[1].priority, 2);
    assert_eq!(recommendations[1].optimization_type, Dimension::Complexity);
}

#[test]
fn parsing_is_deterministic() {
    let source = branchy_function(6);
    let first = parse("det.js", &source);
    let second = parse("det.js", &source);
    assert_eq!(first.len(), second.len());

    let a = complexity_issues("det.js", &source);
    let b = complexity_issues("det.js", &source);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.location, y.location);
    }
}

#[test]
fn engine_recovers_from_unreadable_and_unparsable_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good.js"), "const x = 1;\n").unwrap();
    std::fs::write(dir.path().join("bad.js"), [0xff_u8, 0xfe, 0xff]).unwrap();
    std::fs::write(dir.path().join("broken.js"), ")(\n)(\n)(\n)(\n").unwrap();

    let engine = AnalysisEngine::new(Config::default());
    let result = engine.analyze_root(dir.path()).unwrap();

    // The unreadable file is an error record, the unparsable one is analyzed
    // with a synthetic parser-error issue, and the good file is unaffected.
    assert_eq!(result.stats.files_failed, 1);
    assert!(result.errors[0].path.ends_with("bad.js"));
    assert_eq!(result.stats.files_analyzed, 2);

    let parser_errors: Vec<_> = result
        .issues
        .iter()
        .filter(|i| i.id == "parser-error")
        .collect();
    assert_eq!(parser_errors.len(), 1);
    assert_eq!(parser_errors[0].severity, Severity::Critical);
    assert_eq!(parser_errors[0].location.line, 1);
    assert!(parser_errors[0].file.ends_with("broken.js"));
}

#[test]
fn engine_honors_ignore_globs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.js"), "const x = 1;\n").unwrap();
    let vendored = dir.path().join("node_modules");
    std::fs::create_dir_all(&vendored).unwrap();
    std::fs::write(vendored.join("dep.js"), "eval(payload);\n").unwrap();

    let engine = AnalysisEngine::new(Config::default());
    let result = engine.analyze_root(dir.path()).unwrap();

    assert_eq!(result.stats.files_analyzed, 1);
    assert!(result.files[0].path.ends_with("app.js"));
    assert!(result.issues.is_empty());
}

#[test]
fn clean_project_scores_one_hundred() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("calc.js"), "const total = 1 + 2;\n").unwrap();

    let engine = AnalysisEngine::new(Config::default());
    let result = engine.analyze_root(dir.path()).unwrap();

    assert!(result.issues.is_empty());
    assert_eq!(result.overall_score, 100.0);
    assert_eq!(result.files[0].score, 100.0);
}
