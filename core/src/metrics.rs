//! Metric scoring and recommendation ranking.
//!
//! Every dimension starts at 100 and loses `severity weight * 5` per issue,
//! clamped at zero. Documentation is scored independently from comment
//! density and doc-comment coverage rather than from issues. The overall
//! score is a weighted mean across the dimensions present in the map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Dimension, Issue, Severity};

/// Dimension name -> score in [0, 100]. Recomputed per pass, never mutated
/// in place.
pub type MetricScores = BTreeMap<Dimension, f32>;

const POINTS_PER_WEIGHT: f32 = 5.0;

/// Score the dimensions touched by `issues`, plus documentation when the
/// file declares anything documentable.
pub fn dimension_scores(issues: &[Issue], text: &str) -> MetricScores {
    let mut scores = MetricScores::new();

    for issue in issues {
        if issue.dimension == Dimension::Documentation {
            continue;
        }
        let entry = scores.entry(issue.dimension).or_insert(100.0);
        *entry -= issue.severity.weight() as f32 * POINTS_PER_WEIGHT;
        if *entry < 0.0 {
            *entry = 0.0;
        }
    }

    if let Some(doc) = documentation_score(text) {
        scores.insert(Dimension::Documentation, doc);
    }

    scores
}

/// Comment-density and doc-comment coverage blend. Returns `None` when the
/// file has no declarations to document.
pub fn documentation_score(text: &str) -> Option<f32> {
    let mut total_lines = 0usize;
    let mut comment_lines = 0usize;
    let mut declarations = 0usize;
    let mut documented = 0usize;
    let mut previous_was_doc = false;

    for raw_line in text.lines() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total_lines += 1;

        let is_comment = trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
            || trimmed.starts_with("\"\"\"");
        if is_comment {
            comment_lines += 1;
            let is_doc = trimmed.starts_with("///")
                || trimmed.starts_with("/**")
                || trimmed.starts_with("//!")
                || trimmed.starts_with("\"\"\"");
            if is_doc {
                previous_was_doc = true;
            }
            continue;
        }

        let is_declaration = trimmed.starts_with("fn ")
            || trimmed.starts_with("pub fn ")
            || trimmed.starts_with("function ")
            || trimmed.starts_with("def ")
            || trimmed.starts_with("class ")
            || trimmed.starts_with("export function ")
            || trimmed.starts_with("async function ");
        if is_declaration {
            declarations += 1;
            if previous_was_doc {
                documented += 1;
            }
        }
        previous_was_doc = false;
    }

    if declarations == 0 {
        return None;
    }

    let density = comment_lines as f32 / total_lines.max(1) as f32;
    let density_component = (density / 0.10).min(1.0) * 50.0;
    let coverage_component = (documented as f32 / declarations as f32) * 50.0;
    Some((density_component + coverage_component).clamp(0.0, 100.0))
}

/// Weighted mean across the dimensions present; absent dimensions are
/// excluded from numerator and denominator alike.
pub fn overall_score(scores: &MetricScores) -> f32 {
    let mut numerator = 0.0f32;
    let mut denominator = 0.0f32;
    for (dimension, score) in scores {
        let weight = dimension.weight();
        numerator += score * weight;
        denominator += weight;
    }
    if denominator == 0.0 {
        100.0
    } else {
        (numerator / denominator).clamp(0.0, 100.0)
    }
}

/// Average per-dimension scores across files into one project-level map.
pub fn aggregate_scores(per_file: &[MetricScores]) -> MetricScores {
    let mut sums: BTreeMap<Dimension, (f32, usize)> = BTreeMap::new();
    for scores in per_file {
        for (dimension, score) in scores {
            let entry = sums.entry(*dimension).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(dimension, (sum, count))| (dimension, sum / count as f32))
        .collect()
}

/// A unit of work handed to the transformation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    pub file: String,
    pub priority: u32,
    pub description: String,
    pub line_range: (usize, usize),
    pub optimization_type: Dimension,
}

/// Rank issues into recommendations: severity descending, then the fixed
/// dimension priority order (security first), truncated to `max`.
pub fn rank_recommendations(issues: &[Issue], max: usize) -> Vec<OptimizationRecommendation> {
    let mut ranked: Vec<&Issue> = issues
        .iter()
        .filter(|issue| issue.severity > Severity::Info)
        .collect();
    ranked.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.dimension.priority().cmp(&b.dimension.priority()))
            .then(a.file.cmp(&b.file))
            .then(a.location.line.cmp(&b.location.line))
    });

    ranked
        .into_iter()
        .take(max)
        .enumerate()
        .map(|(index, issue)| OptimizationRecommendation {
            file: issue.file.clone(),
            priority: index as u32 + 1,
            description: format!("{}: {}", issue.title, issue.description),
            line_range: (
                issue.location.line,
                issue.location.end_line.unwrap_or(issue.location.line),
            ),
            optimization_type: issue.dimension,
        })
        .collect()
}
