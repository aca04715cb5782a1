//! Improvement-cycle orchestration.
//!
//! Drives one analyze -> optimize -> validate -> report pass over a project
//! root. The cycle's status is the single source of truth for progress and is
//! only ever advanced here; `failed` and `rolled-back` are the two terminal
//! exits reachable from any non-terminal state. Files touched by the
//! transformer are backed up byte-for-byte before anything is written, and
//! rollback is always a real file-system restore gated only by the
//! auto-rollback flag.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{AnalysisEngine, AnalysisResult};
use crate::metrics::{rank_recommendations, OptimizationRecommendation};
use crate::report;
use crate::validate::{CommandTestRunner, NoTests, TestRunner, ValidationResult, Validator};
use crate::ImprovementPolicy;

/// Lifecycle of one improvement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStatus {
    Pending,
    Analyzing,
    Optimizing,
    Validating,
    Reporting,
    Completed,
    Failed,
    RolledBack,
}

impl CycleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CycleStatus::Completed | CycleStatus::Failed | CycleStatus::RolledBack
        )
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStatus::Pending => "pending",
            CycleStatus::Analyzing => "analyzing",
            CycleStatus::Optimizing => "optimizing",
            CycleStatus::Validating => "validating",
            CycleStatus::Reporting => "reporting",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
            CycleStatus::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

/// One file rewritten by the transformer: original and candidate content
/// plus the rule ids the transformer claims to have applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransformation {
    pub path: PathBuf,
    pub original: String,
    pub transformed: String,
    pub applied_rules: Vec<String>,
}

/// What the transformer produced for one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub transformations: Vec<FileTransformation>,
    /// Transformer-reported estimate in [0, 1] of how much of the
    /// recommended work it performed.
    pub improvement_factor: f32,
}

/// Opaque code-rewriting collaborator. Receives the project root and the
/// ranked recommendations; returns candidate content. Any failure here is a
/// phase failure for the cycle.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;
    fn optimize(
        &self,
        root: &Path,
        recommendations: &[OptimizationRecommendation],
    ) -> Result<OptimizationResult>;
}

/// Transformer that rewrites nothing. Keeps the state machine exercisable
/// end-to-end when no external transformation service is wired in.
pub struct NoopTransformer;

impl Transformer for NoopTransformer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn optimize(
        &self,
        _root: &Path,
        _recommendations: &[OptimizationRecommendation],
    ) -> Result<OptimizationResult> {
        Ok(OptimizationResult::default())
    }
}

/// One full pipeline run. Serialized as-is into the cycle's artifact
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub analysis: Option<AnalysisResult>,
    pub recommendations: Vec<OptimizationRecommendation>,
    pub optimization: Option<OptimizationResult>,
    pub validation: Option<ValidationResult>,
    pub improvement_score: Option<f32>,
    pub errors: Vec<String>,
}

impl Cycle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: CycleStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            analysis: None,
            recommendations: Vec::new(),
            optimization: None,
            validation: None,
            improvement_score: None,
            errors: Vec::new(),
        }
    }

    fn advance(&mut self, status: CycleStatus) {
        debug_assert!(!self.status.is_terminal());
        self.status = status;
    }

    fn finish(&mut self, status: CycleStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Drives the improvement cycle over a project root and persists the
/// per-phase artifacts into an output directory.
pub struct Orchestrator {
    engine: AnalysisEngine,
    transformer: Box<dyn Transformer>,
    output_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        engine: AnalysisEngine,
        transformer: Box<dyn Transformer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            transformer,
            output_dir: output_dir.into(),
        }
    }

    /// Run one full cycle. Phase errors finish the cycle as `failed` (with a
    /// rollback attempt when backups exist) rather than propagating; the
    /// returned cycle always reflects what actually happened on disk.
    pub fn run(&self, root: &Path) -> Result<Cycle> {
        let mut cycle = Cycle::new();
        let cycle_dir = self.output_dir.join(&cycle.id);
        fs::create_dir_all(&cycle_dir)
            .with_context(|| format!("creating cycle directory {}", cycle_dir.display()))?;

        let mut backups: BTreeMap<PathBuf, String> = BTreeMap::new();
        match self.drive(root, &cycle_dir, &mut cycle, &mut backups) {
            Ok(()) => {}
            Err(err) => {
                cycle.errors.push(format!("{err:#}"));
                if self.engine.config().pipeline.auto_rollback && !backups.is_empty() {
                    if let Err(restore_err) = restore_backups(&backups) {
                        cycle.errors.push(format!("rollback failed: {restore_err:#}"));
                    }
                }
                cycle.finish(CycleStatus::Failed);
            }
        }

        persist_json(&cycle_dir.join("cycle.json"), &cycle)?;
        Ok(cycle)
    }

    fn drive(
        &self,
        root: &Path,
        cycle_dir: &Path,
        cycle: &mut Cycle,
        backups: &mut BTreeMap<PathBuf, String>,
    ) -> Result<()> {
        let config = self.engine.config().clone();
        let policy = config.pipeline.improvement.clone();

        // Analyze.
        cycle.advance(CycleStatus::Analyzing);
        let analysis = self.engine.analyze_root(root)?;
        persist_json(&cycle_dir.join("analysis.json"), &analysis)?;
        let baseline_score = analysis.overall_score;
        cycle.recommendations =
            rank_recommendations(&analysis.issues, config.pipeline.max_recommendations);
        cycle.analysis = Some(analysis);

        // Optimize: back up every file the recommendations name before the
        // transformer runs; a partial backup is a phase failure.
        cycle.advance(CycleStatus::Optimizing);
        for recommendation in &cycle.recommendations {
            let path = PathBuf::from(&recommendation.file);
            if backups.contains_key(&path) {
                continue;
            }
            let original = fs::read_to_string(&path)
                .with_context(|| format!("backing up {}", path.display()))?;
            backups.insert(path, original);
        }
        let optimization = self
            .transformer
            .optimize(root, &cycle.recommendations)
            .with_context(|| format!("transformer `{}`", self.transformer.name()))?;
        for transformation in &optimization.transformations {
            if !backups.contains_key(&transformation.path) {
                bail!(
                    "transformer touched {} without a backup",
                    transformation.path.display()
                );
            }
            fs::write(&transformation.path, &transformation.transformed)
                .with_context(|| format!("writing {}", transformation.path.display()))?;
        }
        persist_json(&cycle_dir.join("optimization.json"), &optimization)?;
        let transformed: Vec<PathBuf> = optimization
            .transformations
            .iter()
            .map(|t| t.path.clone())
            .collect();
        let improvement_factor = optimization.improvement_factor;
        cycle.optimization = Some(optimization);

        // Validate.
        cycle.advance(CycleStatus::Validating);
        let test_runner: Box<dyn TestRunner> = match &config.pipeline.test_command {
            Some(command) => Box::new(CommandTestRunner::new(command.clone())),
            None => Box::new(NoTests),
        };
        let validator = Validator::new(test_runner, config.pipeline.max_performance_regressions);
        let validation = validator.validate(root, &transformed, Some(baseline_score))?;
        persist_json(&cycle_dir.join("validation.json"), &validation)?;

        if validation.rollback_recommended {
            if config.pipeline.auto_rollback {
                restore_backups(backups)?;
                cycle.validation = Some(validation);
                cycle.finish(CycleStatus::RolledBack);
                return Ok(());
            }
            // A completed cycle must not carry a rollback recommendation, so
            // with auto-rollback disabled the candidate stays on disk and the
            // cycle fails.
            cycle.validation = Some(validation);
            return Err(anyhow!(
                "validation recommended rollback but auto-rollback is disabled"
            ));
        }
        cycle.improvement_score = Some(improvement_score(
            &policy,
            improvement_factor,
            &validation,
        ));
        cycle.validation = Some(validation);

        // Report.
        cycle.advance(CycleStatus::Reporting);

        // Reports describe the finished cycle, so the terminal state is set
        // before rendering; a failed report write still ends the cycle as
        // failed through the caller.
        cycle.finish(CycleStatus::Completed);
        for format in &config.pipeline.formats {
            let rendered = report::render(cycle, *format)?;
            let path = cycle_dir.join(format!("report.{}", format.extension()));
            fs::write(&path, rendered)
                .with_context(|| format!("writing report {}", path.display()))?;
        }
        Ok(())
    }
}

/// Base 50, plus the transformer's factor scaled by 20, minus a penalty
/// proportional to the validation issues (capped at 40), averaged with the
/// validation quality score. The constants are policy, not law; they live in
/// `ImprovementPolicy` so callers can tune them.
fn improvement_score(
    policy: &ImprovementPolicy,
    factor: f32,
    validation: &ValidationResult,
) -> f32 {
    let penalty = if validation.issues.is_empty() {
        0.0
    } else {
        let total_weight: u32 = validation
            .issues
            .iter()
            .map(|issue| issue.severity.weight())
            .sum();
        let average = total_weight as f32 / validation.issues.len() as f32;
        (average * validation.issues.len() as f32).min(policy.penalty_cap)
    };
    let raw = policy.base + factor * policy.factor_scale - penalty;
    ((raw + validation.quality_score) / 2.0).clamp(0.0, 100.0)
}

fn restore_backups(backups: &BTreeMap<PathBuf, String>) -> Result<()> {
    for (path, original) in backups {
        fs::write(path, original)
            .with_context(|| format!("restoring {}", path.display()))?;
    }
    Ok(())
}

fn persist_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing artifact")?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
