//! Report rendering.
//!
//! Turns a finished cycle into a textual artifact. Output is deterministic
//! for identical inputs: JSON goes through serde, the other formats are
//! assembled from the cycle's already-sorted collections.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::AnalysisResult;
use crate::pipeline::Cycle;
use crate::validate::ValidationResult;

/// Output format for a cycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    Json,
    Markdown,
    Html,
    Text,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
            ReportFormat::Text => "txt",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            "text" | "txt" => Ok(ReportFormat::Text),
            other => Err(format!("unknown report format `{other}`")),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
            ReportFormat::Text => "text",
        };
        f.write_str(name)
    }
}

/// Render one cycle in the requested format.
pub fn render(cycle: &Cycle, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => {
            serde_json::to_string_pretty(cycle).context("serializing cycle report")
        }
        ReportFormat::Markdown => Ok(render_markdown(cycle)),
        ReportFormat::Html => Ok(render_html(cycle)),
        ReportFormat::Text => Ok(render_text(cycle)),
    }
}

fn render_markdown(cycle: &Cycle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Improvement cycle {}", cycle.id);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Status: **{}**", cycle.status);
    let _ = writeln!(out, "- Started: {}", cycle.started_at.to_rfc3339());
    if let Some(finished) = cycle.finished_at {
        let _ = writeln!(out, "- Finished: {}", finished.to_rfc3339());
    }
    if let Some(score) = cycle.improvement_score {
        let _ = writeln!(out, "- Improvement score: {score:.1}");
    }

    if let Some(analysis) = &cycle.analysis {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Analysis");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", analysis.summary);
        let _ = writeln!(out);
        let _ = writeln!(out, "| Dimension | Score |");
        let _ = writeln!(out, "| --- | ---: |");
        for (dimension, score) in &analysis.metric_scores {
            let _ = writeln!(out, "| {dimension} | {score:.1} |");
        }
        let _ = writeln!(out, "| **overall** | **{:.1}** |", analysis.overall_score);

        if !analysis.issues.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "### Issues");
            let _ = writeln!(out);
            for issue in &analysis.issues {
                let _ = writeln!(
                    out,
                    "- `{}` [{}] {}:{} — {}",
                    issue.id, issue.severity, issue.file, issue.location.line, issue.title
                );
            }
        }
    }

    if !cycle.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Recommendations");
        let _ = writeln!(out);
        for rec in &cycle.recommendations {
            let _ = writeln!(
                out,
                "{}. [{}] {} (lines {}-{}): {}",
                rec.priority,
                rec.optimization_type,
                rec.file,
                rec.line_range.0,
                rec.line_range.1,
                rec.description
            );
        }
    }

    if let Some(validation) = &cycle.validation {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Validation");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", validation_line(validation));
    }

    if !cycle.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        let _ = writeln!(out);
        for error in &cycle.errors {
            let _ = writeln!(out, "- {error}");
        }
    }

    out
}

fn render_text(cycle: &Cycle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Improvement cycle {}", cycle.id);
    let _ = writeln!(out, "Status: {}", cycle.status);
    if let Some(score) = cycle.improvement_score {
        let _ = writeln!(out, "Improvement score: {score:.1}");
    }
    if let Some(analysis) = &cycle.analysis {
        let _ = writeln!(out, "{}", analysis.summary);
        for issue in &analysis.issues {
            let _ = writeln!(
                out,
                "  {}:{} [{}] {}",
                issue.file, issue.location.line, issue.severity, issue.title
            );
        }
    }
    if let Some(validation) = &cycle.validation {
        let _ = writeln!(out, "{}", validation_line(validation));
    }
    for error in &cycle.errors {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn render_html(cycle: &Cycle) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Improvement cycle {}</h1>", escape(&cycle.id));
    let _ = writeln!(body, "<p>Status: <strong>{}</strong></p>", cycle.status);
    if let Some(score) = cycle.improvement_score {
        let _ = writeln!(body, "<p>Improvement score: {score:.1}</p>");
    }
    if let Some(analysis) = &cycle.analysis {
        let _ = writeln!(body, "<p>{}</p>", escape(&analysis.summary));
        let _ = writeln!(body, "{}", score_table(analysis));
        if !analysis.issues.is_empty() {
            let _ = writeln!(body, "<ul>");
            for issue in &analysis.issues {
                let _ = writeln!(
                    body,
                    "<li><code>{}</code> [{}] {}:{} — {}</li>",
                    escape(&issue.id),
                    issue.severity,
                    escape(&issue.file),
                    issue.location.line,
                    escape(&issue.title)
                );
            }
            let _ = writeln!(body, "</ul>");
        }
    }
    if let Some(validation) = &cycle.validation {
        let _ = writeln!(body, "<p>{}</p>", escape(&validation_line(validation)));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Cycle {}</title></head>\n<body>\n{}</body>\n</html>\n",
        escape(&cycle.id),
        body
    )
}

fn score_table(analysis: &AnalysisResult) -> String {
    let mut out = String::from("<table>\n<tr><th>Dimension</th><th>Score</th></tr>\n");
    for (dimension, score) in &analysis.metric_scores {
        let _ = writeln!(out, "<tr><td>{dimension}</td><td>{score:.1}</td></tr>");
    }
    let _ = writeln!(
        out,
        "<tr><td><strong>overall</strong></td><td><strong>{:.1}</strong></td></tr>",
        analysis.overall_score
    );
    out.push_str("</table>");
    out
}

fn validation_line(validation: &ValidationResult) -> String {
    format!(
        "Validation: {} syntax error(s), {} passed / {} failed / {} skipped test(s), \
         {} regression(s), quality {:.1}, rollback {}",
        validation.syntax_error_count,
        validation.tests_passed,
        validation.tests_failed,
        validation.tests_skipped,
        validation.performance_regressions,
        validation.quality_score,
        if validation.rollback_recommended {
            "recommended"
        } else {
            "not recommended"
        }
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
