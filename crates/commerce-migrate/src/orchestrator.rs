//! Job orchestration: runs steps in order, re-invoking each until it is terminal.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::connectors::{SourceProfile, TargetProfile};
use crate::error::{Error, Result};
use crate::mapping::MappingStore;
use crate::progress::{Progress, ProgressState};
use crate::resources::{create_adapter, Invocation, Step, StepContext};
use crate::retry::RetryConfig;

/// Statistics of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step.
    pub step: Step,
    /// Final state.
    pub state: ProgressState,
    /// Invocations needed.
    pub invocations: u64,
    /// Rows handled (imported or skipped).
    pub rows: u64,
    /// Rows skipped with a diagnostic.
    pub skipped: u64,
    /// Error message when the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

/// Outcome of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Steps that ran, in order.
    pub steps: Vec<StepReport>,
    /// Steps skipped because they were neither enabled nor requested by an earlier step.
    pub disabled: Vec<Step>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl JobReport {
    /// The step that ended the job with an error, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|report| report.state == ProgressState::Error)
    }

    /// Rows handled across all steps.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.steps.iter().map(|report| report.rows).sum()
    }

    /// Rows per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_rows() as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Resumable position of a job, written after every invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Steps finished with `done`.
    pub completed: Vec<Step>,
    /// Step in flight.
    pub current: Option<Step>,
    /// Progress of the step in flight.
    pub progress: Option<Progress>,
    /// Parameters carried between steps.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl JobCheckpoint {
    /// Starts a new run.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ..Self::default()
        }
    }

    /// Loads a checkpoint; `None` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)
            .map_err(|e| Error::Checkpoint(format!("cannot open {}: {}", path.display(), e)))?;
        let checkpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Checkpoint(format!("cannot parse {}: {}", path.display(), e)))?;
        Ok(Some(checkpoint))
    }

    /// Writes the checkpoint through a temporary file and a rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(writer, self)?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::Checkpoint(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn is_requested(&self, step: Step) -> bool {
        match self.params.get(step.as_str()) {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }
}

type InvocationHook<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

/// Drives the steps of a job.
pub struct Migrator<'a> {
    source: &'a dyn SourceProfile,
    target: &'a dyn TargetProfile,
    mappings: &'a dyn MappingStore,
    config: &'a MigrationConfig,
    checkpoint_path: Option<PathBuf>,
    after_invocation: Option<InvocationHook<'a>>,
    show_progress: bool,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator over the given connectors and store.
    #[must_use]
    pub fn new(
        source: &'a dyn SourceProfile,
        target: &'a dyn TargetProfile,
        mappings: &'a dyn MappingStore,
        config: &'a MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            mappings,
            config,
            checkpoint_path: config.options.checkpoint_file(),
            after_invocation: None,
            show_progress: false,
        }
    }

    /// Overrides where the checkpoint is written.
    #[must_use]
    pub fn with_checkpoint(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint_path = path;
        self
    }

    /// Runs `hook` after every invocation, before the checkpoint is written.
    #[must_use]
    pub fn after_invocation(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.after_invocation = Some(Box::new(hook));
        self
    }

    /// Shows a progress bar per step.
    #[must_use]
    pub fn with_progress_bars(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn context(&self) -> StepContext<'_> {
        StepContext {
            source: self.source,
            target: self.target,
            mappings: self.mappings,
            config: &self.config.step,
            budget: self.config.options.budget(),
            retry: RetryConfig::with_retries(self.config.options.source_retries),
        }
    }

    /// Runs a single invocation of `step`.
    pub async fn invoke(&self, step: Step, progress: Progress) -> Invocation {
        create_adapter(step).run(&self.context(), progress).await
    }

    fn persist(&mut self, checkpoint: &JobCheckpoint) -> Result<()> {
        if let Some(hook) = self.after_invocation.as_mut() {
            hook()?;
        }
        if let Some(path) = &self.checkpoint_path {
            checkpoint.save(path)?;
        }
        Ok(())
    }

    /// Runs the configured steps, resuming from `resume` when given.
    ///
    /// A step runs when it is enabled in the config or an earlier step asked
    /// for it through a carried parameter. The job stops at the first step
    /// that ends in the error state.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint or the invocation hook fails.
    /// Step failures are reported in the [`JobReport`].
    pub async fn run_job(&mut self, resume: Option<JobCheckpoint>) -> Result<JobReport> {
        let start = Instant::now();
        let mut checkpoint = resume.unwrap_or_else(JobCheckpoint::new);
        let mut report = JobReport {
            run_id: checkpoint.run_id,
            steps: Vec::new(),
            disabled: Vec::new(),
            duration_secs: 0.0,
        };
        info!("Starting migration run {}", checkpoint.run_id);

        for step in self.config.steps.clone() {
            if checkpoint.completed.contains(&step) {
                info!("Step {} already completed, skipping", step);
                continue;
            }
            if !self.config.step.is_enabled(step) && !checkpoint.is_requested(step) {
                debug!("Step {} is not enabled", step);
                report.disabled.push(step);
                continue;
            }

            let progress = match (checkpoint.current, checkpoint.progress.take()) {
                (Some(current), Some(mut progress)) if current == step => {
                    info!("Resuming {} at offset {}", step, progress.offset);
                    // a failed step is retried from the failing row
                    progress.state = ProgressState::Running;
                    progress.error_message = None;
                    progress
                }
                _ => Progress::with_params(checkpoint.params.clone()),
            };

            let step_report = self.run_step(step, progress, &mut checkpoint).await?;
            let failed = step_report.state == ProgressState::Error;
            report.steps.push(step_report);
            if failed {
                break;
            }
        }

        report.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Migration run {} finished: {} rows in {:.2}s ({:.0} rows/sec)",
            report.run_id,
            report.total_rows(),
            report.duration_secs,
            report.throughput()
        );
        Ok(report)
    }

    async fn run_step(
        &mut self,
        step: Step,
        mut progress: Progress,
        checkpoint: &mut JobCheckpoint,
    ) -> Result<StepReport> {
        let start = Instant::now();
        let bar = self.progress_bar(step);
        let mut report = StepReport {
            step,
            state: ProgressState::Running,
            invocations: 0,
            rows: 0,
            skipped: 0,
            error: None,
            duration_secs: 0.0,
        };
        info!("Processing: {}", step);

        loop {
            let invocation = self.invoke(step, progress).await;
            report.invocations += 1;
            report.rows += invocation.rows;
            report.skipped += invocation.diagnostics.len() as u64;
            progress = invocation.progress;

            bar.set_length(progress.count);
            bar.set_position(progress.offset);

            checkpoint
                .params
                .extend(progress.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            match progress.state {
                ProgressState::Done => {
                    checkpoint.completed.push(step);
                    checkpoint.current = None;
                    checkpoint.progress = None;
                }
                ProgressState::Running | ProgressState::Error => {
                    checkpoint.current = Some(step);
                    checkpoint.progress = Some(progress.clone());
                }
            }
            self.persist(checkpoint)?;

            if progress.is_terminal() {
                break;
            }
            debug!(
                "{}: yielded at {}/{}, invoking again",
                step, progress.offset, progress.count
            );
        }

        report.state = progress.state;
        report.duration_secs = start.elapsed().as_secs_f64();
        match progress.state {
            ProgressState::Error => {
                let message = progress.error_message.unwrap_or_default();
                warn!("Step {} failed at offset {}: {}", step, progress.offset, message);
                bar.abandon_with_message(format!("{} failed", step));
                report.error = Some(message);
            }
            _ => {
                info!(
                    "Step {} done: {} rows, {} skipped, {} invocations",
                    step, report.rows, report.skipped, report.invocations
                );
                bar.finish_with_message(format!("{} done", step));
            }
        }
        Ok(report)
    }

    fn progress_bar(&self, step: Step) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} {prefix:>18} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_prefix(step.as_str());
        pb
    }
}
