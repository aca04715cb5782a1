//! Code-improvement pipeline core engine.
//! Parses source files into syntax trees, runs rule-based analyzers over
//! them, scores the results per quality dimension, and drives the
//! analyze → optimize → validate → report cycle with snapshot rollback.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod complexity;
pub mod engine;
pub mod metrics;
pub mod patterns;
pub mod pipeline;
pub mod report;
pub mod security;
pub mod tree;
pub mod validate;

pub use engine::{AnalysisEngine, AnalysisResult, FileAnalysis, RuleAnalyzer};
pub use metrics::{rank_recommendations, OptimizationRecommendation};
pub use pipeline::{
    Cycle, CycleStatus, FileTransformation, NoopTransformer, OptimizationResult, Orchestrator,
    Transformer,
};
pub use report::ReportFormat;
pub use tree::SyntaxTree;
pub use validate::{TestRunner, ValidationResult};

/// Issue severity, ordered from least to most serious.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Weight used by the metric score subtraction (score -= weight * 5).
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Error => 3,
            Severity::Critical => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Quality dimension a metric score or issue belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Security,
    Performance,
    Maintainability,
    Complexity,
    TypeConformance,
    Documentation,
    Duplication,
    Dependencies,
    Tests,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Security,
        Dimension::Performance,
        Dimension::Maintainability,
        Dimension::Complexity,
        Dimension::TypeConformance,
        Dimension::Documentation,
        Dimension::Duplication,
        Dimension::Dependencies,
        Dimension::Tests,
    ];

    /// Fixed weight in the overall weighted-mean score.
    pub fn weight(&self) -> f32 {
        match self {
            Dimension::Security => 0.25,
            Dimension::Performance => 0.20,
            Dimension::Maintainability => 0.20,
            Dimension::Complexity => 0.15,
            Dimension::TypeConformance => 0.10,
            Dimension::Documentation => 0.05,
            Dimension::Duplication => 0.05,
            Dimension::Dependencies => 0.05,
            Dimension::Tests => 0.05,
        }
    }

    /// Ranking order for recommendation selection; lower comes first.
    pub fn priority(&self) -> u8 {
        match self {
            Dimension::Security => 0,
            Dimension::Performance => 1,
            Dimension::Complexity => 2,
            Dimension::Maintainability => 3,
            Dimension::TypeConformance => 4,
            Dimension::Duplication => 5,
            Dimension::Dependencies => 6,
            Dimension::Tests => 7,
            Dimension::Documentation => 8,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Security => "security",
            Dimension::Performance => "performance",
            Dimension::Maintainability => "maintainability",
            Dimension::Complexity => "complexity",
            Dimension::TypeConformance => "type-conformance",
            Dimension::Documentation => "documentation",
            Dimension::Duplication => "duplication",
            Dimension::Dependencies => "dependencies",
            Dimension::Tests => "tests",
        };
        f.write_str(name)
    }
}

/// Strictness level controlling which security rules run.
/// Ordering is basic < standard < thorough; a rule applies iff its minimum
/// level is at or below the configured level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScanLevel {
    Basic,
    Standard,
    Thorough,
}

impl Default for ScanLevel {
    fn default() -> Self {
        ScanLevel::Standard
    }
}

impl fmt::Display for ScanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanLevel::Basic => "basic",
            ScanLevel::Standard => "standard",
            ScanLevel::Thorough => "thorough",
        };
        f.write_str(name)
    }
}

/// Location metadata in 1-based line/column coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            end_line: None,
        }
    }

    pub fn with_end(line: usize, column: usize, end_line: usize) -> Self {
        Self {
            line,
            column,
            end_line: Some(end_line),
        }
    }
}

/// A single finding emitted by a rule analyzer.
/// Issues are immutable once created and aggregated by value; duplicate ids
/// across analyzers are kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub dimension: Dimension,
    pub file: String,
    pub location: Location,
    pub suggestions: Vec<String>,
}

/// Warning/error threshold pair for a single metric. A value at or above
/// `error` yields an Error issue, at or above `warning` a Warning issue,
/// otherwise nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub warning: u32,
    pub error: u32,
}

impl MetricThreshold {
    pub fn classify(&self, value: u32) -> Option<Severity> {
        if value >= self.error {
            Some(Severity::Error)
        } else if value >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// Per-function complexity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityThresholds {
    pub cyclomatic: MetricThreshold,
    pub cognitive: MetricThreshold,
    pub nesting: MetricThreshold,
    pub parameters: MetricThreshold,
    pub function_lines: MetricThreshold,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            cyclomatic: MetricThreshold {
                warning: 10,
                error: 20,
            },
            cognitive: MetricThreshold {
                warning: 15,
                error: 30,
            },
            nesting: MetricThreshold {
                warning: 4,
                error: 6,
            },
            parameters: MetricThreshold {
                warning: 5,
                error: 8,
            },
            function_lines: MetricThreshold {
                warning: 50,
                error: 100,
            },
        }
    }
}

/// File-level size caps. Exceeding a cap raises a Warning; exceeding the
/// escalation multiple (2x for lines and classes, 1.5x for functions)
/// raises an Error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCaps {
    pub max_lines: usize,
    pub max_functions: usize,
    pub max_classes: usize,
}

impl Default for FileCaps {
    fn default() -> Self {
        Self {
            max_lines: 500,
            max_functions: 20,
            max_classes: 3,
        }
    }
}

/// Overall-score thresholds for warnings / failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub warn_below: f32,
    pub fail_below: f32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            warn_below: 70.0,
            fail_below: 50.0,
        }
    }
}

/// Tunable constants of the cycle improvement score. The shape
/// (base + factor * scale - capped penalty, blended with the validation
/// quality score when present) is kept for compatibility with earlier
/// report consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImprovementPolicy {
    pub base: f32,
    pub factor_scale: f32,
    pub penalty_cap: f32,
}

impl Default for ImprovementPolicy {
    fn default() -> Self {
        Self {
            base: 50.0,
            factor_scale: 20.0,
            penalty_cap: 40.0,
        }
    }
}

/// Options for the improvement cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub auto_rollback: bool,
    pub max_recommendations: usize,
    pub formats: Vec<report::ReportFormat>,
    pub test_command: Option<String>,
    pub max_performance_regressions: usize,
    pub improvement: ImprovementPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            max_recommendations: 10,
            formats: vec![report::ReportFormat::Json],
            test_command: None,
            max_performance_regressions: 5,
            improvement: ImprovementPolicy::default(),
        }
    }
}

/// Top-level configuration for the engine and pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan_level: ScanLevel,
    pub complexity: ComplexityThresholds,
    pub file_caps: FileCaps,
    pub scores: ScoreThresholds,
    pub ignore_globs: Vec<String>,
    pub extensions: Vec<String>,
    pub max_workers: Option<usize>,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_level: ScanLevel::default(),
            complexity: ComplexityThresholds::default(),
            file_caps: FileCaps::default(),
            scores: ScoreThresholds::default(),
            ignore_globs: vec![
                "vendor/**".into(),
                "third_party/**".into(),
                "**/node_modules/**".into(),
                "**/*.min.*".into(),
                "**/dist/**".into(),
                "**/build/**".into(),
                "**/.git/**".into(),
                "**/target/**".into(),
                "**/out/**".into(),
                "**/coverage/**".into(),
            ],
            extensions: vec![
                "js".into(),
                "jsx".into(),
                "ts".into(),
                "tsx".into(),
                "py".into(),
                "rs".into(),
            ],
            max_workers: None,
            pipeline: PipelineConfig::default(),
        }
    }
}
