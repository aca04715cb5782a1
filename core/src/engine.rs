//! Analysis engine.
//!
//! Collects source files under a root, dispatches each file to an isolated
//! worker that parses and runs every registered rule analyzer, and folds the
//! per-file records into a project-level result. A single file's failure is
//! recorded and excluded from aggregates; it never aborts the batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::complexity::ComplexityAnalyzer;
use crate::metrics::{self, MetricScores};
use crate::patterns::PatternAnalyzer;
use crate::security::SecurityAnalyzer;
use crate::tree::{self, SyntaxTree};
use crate::{Config, Dimension, Issue, Location, Severity};

/// Uniform entry point every rule analyzer implements. Analyzers hold no
/// per-file state so the engine can run them concurrently across files.
pub trait RuleAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze_file(&self, path: &Path, text: &str, tree: &SyntaxTree) -> Result<Vec<Issue>>;
}

/// Completed record for one analyzed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    pub lines: usize,
    pub issues: Vec<Issue>,
    pub score: f32,
    pub metric_scores: MetricScores,
}

/// Per-file failure recorded at batch level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// Aggregate counters over one analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub files_analyzed: usize,
    pub files_failed: usize,
    pub total_lines: usize,
    pub total_issues: usize,
    pub issues_by_severity: BTreeMap<Severity, usize>,
}

/// Project-level result of one engine run. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileAnalysis>,
    pub issues: Vec<Issue>,
    pub errors: Vec<FileError>,
    pub stats: AnalysisStats,
    pub metric_scores: MetricScores,
    pub overall_score: f32,
    pub summary: String,
}

pub struct AnalysisEngine {
    config: Config,
    analyzers: Vec<Box<dyn RuleAnalyzer>>,
}

impl AnalysisEngine {
    /// Engine with the standard analyzer set, in registration order:
    /// complexity, security, structural patterns.
    pub fn new(config: Config) -> Self {
        let analyzers: Vec<Box<dyn RuleAnalyzer>> = vec![
            Box::new(ComplexityAnalyzer::new(
                config.complexity.clone(),
                config.file_caps.clone(),
            )),
            Box::new(SecurityAnalyzer::new(config.scan_level)),
            Box::new(PatternAnalyzer::new()),
        ];
        Self { config, analyzers }
    }

    /// Engine with a caller-supplied analyzer list.
    pub fn with_analyzers(config: Config, analyzers: Vec<Box<dyn RuleAnalyzer>>) -> Self {
        Self { config, analyzers }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List analyzable files under `root`, honoring the configured extension
    /// filter and exclusion globs.
    pub fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let ignore = build_ignore_set(&self.config.ignore_globs)?;
        let mut files = Vec::new();
        let mut walker = WalkDir::new(root).into_iter();
        while let Some(entry_res) = walker.next() {
            let entry = entry_res.with_context(|| format!("walking {}", root.display()))?;
            let entry_path = entry.path();
            let rel = entry_path.strip_prefix(root).unwrap_or(entry_path);
            if let Some(set) = &ignore {
                if set.is_match(rel) {
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }
            if entry.file_type().is_file() && self.is_supported(entry_path) {
                files.push(entry_path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_supported(&self, path: &Path) -> bool {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => {
                let ext = ext.to_lowercase();
                self.config.extensions.iter().any(|e| e == &ext)
            }
            None => false,
        }
    }

    /// Analyze every supported file under `root`.
    pub fn analyze_root(&self, root: &Path) -> Result<AnalysisResult> {
        let files = self.collect_files(root)?;
        self.analyze_files(&files)
    }

    /// Analyze an explicit file list. Per-file work runs on a bounded rayon
    /// pool (available parallelism minus one unless configured); each worker
    /// owns its tree and issues, and only completed records cross back.
    pub fn analyze_files(&self, files: &[PathBuf]) -> Result<AnalysisResult> {
        let workers = self.config.max_workers.unwrap_or_else(default_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("building analysis thread pool")?;

        let outcomes: Vec<Result<FileAnalysis, FileError>> =
            pool.install(|| files.par_iter().map(|path| self.analyze_one(path)).collect());

        let mut file_records = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => file_records.push(record),
                Err(error) => errors.push(error),
            }
        }
        file_records.sort_by(|a, b| a.path.cmp(&b.path));
        errors.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(assemble_result(file_records, errors))
    }

    /// Analyze a single file end to end. A parse failure becomes one
    /// synthetic Critical issue; only an unreadable file is a `FileError`.
    fn analyze_one(&self, path: &Path) -> Result<FileAnalysis, FileError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|err| FileError {
            path: display.clone(),
            message: format!("failed to read: {err}"),
        })?;
        let lines = text.lines().count();

        let issues = match tree::parse(path, &text) {
            Ok(tree) => {
                let mut issues = Vec::new();
                for analyzer in &self.analyzers {
                    match analyzer.analyze_file(path, &text, &tree) {
                        Ok(mut found) => issues.append(&mut found),
                        Err(err) => {
                            eprintln!(
                                "analyzer `{}` failed on {}: {err}",
                                analyzer.name(),
                                display
                            );
                        }
                    }
                }
                issues
            }
            Err(failure) => vec![parser_error_issue(&display, &failure)],
        };

        let metric_scores = metrics::dimension_scores(&issues, &text);
        let score = metrics::overall_score(&metric_scores);
        Ok(FileAnalysis {
            path: display,
            lines,
            issues,
            score,
            metric_scores,
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn parser_error_issue(file: &str, failure: &tree::ParseFailure) -> Issue {
    Issue {
        id: "parser-error".into(),
        title: "Parser error".into(),
        description: failure.to_string(),
        severity: Severity::Critical,
        dimension: Dimension::Maintainability,
        file: file.to_string(),
        location: Location::new(1, 1),
        suggestions: vec!["Fix the syntax error before further analysis.".into()],
    }
}

fn assemble_result(files: Vec<FileAnalysis>, errors: Vec<FileError>) -> AnalysisResult {
    let mut issues = Vec::new();
    let mut issues_by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
    let mut total_lines = 0usize;
    for record in &files {
        total_lines += record.lines;
        for issue in &record.issues {
            *issues_by_severity.entry(issue.severity).or_default() += 1;
            issues.push(issue.clone());
        }
    }

    let per_file: Vec<MetricScores> = files.iter().map(|f| f.metric_scores.clone()).collect();
    let metric_scores = metrics::aggregate_scores(&per_file);
    let overall_score = metrics::overall_score(&metric_scores);

    let stats = AnalysisStats {
        files_analyzed: files.len(),
        files_failed: errors.len(),
        total_lines,
        total_issues: issues.len(),
        issues_by_severity,
    };

    let summary = format!(
        "Analyzed {} file(s) ({} failed): {} issue(s); overall score {:.1}.",
        stats.files_analyzed, stats.files_failed, stats.total_issues, overall_score
    );

    AnalysisResult {
        analysis_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        files,
        issues,
        errors,
        stats,
        metric_scores,
        overall_score,
        summary,
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob `{pattern}`"))?);
    }
    Ok(Some(builder.build().context("building ignore glob set")?))
}
