//! Lane executor
//!
//! Runs a plan's steps sequentially against an [`ActionRunner`], honoring
//! each step's failure policy: after a failure or cancellation the remaining
//! abort-policy steps are skipped while always-run cleanup still executes.
//! The run directory collects lane_plan.json, lane_state.json,
//! lane_summary.json, and one log per executed action.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::action::{ActionError, ActionKind, ActionRunner};
use crate::plan::LanePlan;
use crate::state::{LaneStateData, LaneStateError};
use crate::summary::{ArtifactRecord, FailureKind, LaneSummary, StepSummary};

/// Errors from preparing or executing a lane run
#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("Failed to persist lane state: {0}")]
    State(#[from] LaneStateError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Root directory for run artifacts.
///
/// `$HOME/.local/share/shiplane/runs`, or `/tmp/shiplane/runs` when HOME
/// is not set.
pub fn default_runs_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".local/share/shiplane/runs"),
        _ => PathBuf::from("/tmp/shiplane/runs"),
    }
}

/// Create the per-run directory under the runs root
pub fn prepare_run_dir(root: &Path, run_id: &str) -> io::Result<PathBuf> {
    let dir = root.join(run_id);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a fresh run identifier (lowercase ULID)
pub fn new_run_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Executes one lane plan against an action runner
pub struct LaneExecutor<'a> {
    runner: &'a dyn ActionRunner,
    cancel: Arc<AtomicBool>,
}

impl<'a> LaneExecutor<'a> {
    pub fn new(runner: &'a dyn ActionRunner) -> Self {
        Self {
            runner,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use a shared cancellation flag (set by the signal handler)
    pub fn with_cancel_flag(runner: &'a dyn ActionRunner, cancel: Arc<AtomicBool>) -> Self {
        Self { runner, cancel }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run the plan to completion and write the run artifacts.
    ///
    /// Returns the aggregated summary; the process exit code comes from it.
    /// Step failures do not early-return, they are recorded and drive the
    /// policy loop.
    pub fn execute(
        &self,
        plan: &LanePlan,
        run_dir: &Path,
        config_digest: Option<&str>,
    ) -> Result<LaneSummary, LaneError> {
        tracing::info!(
            run_id = %plan.run_id,
            lane = %plan.lane,
            variant = %plan.variant,
            "starting lane run"
        );

        plan.write_to_run_dir(run_dir)?;

        let mut state = LaneStateData::new(
            plan.run_id.clone(),
            plan.app.clone(),
            plan.lane.clone(),
            plan.variant.clone(),
        );
        state.write_to_run_dir(run_dir)?;

        let started = Instant::now();
        let total = plan.steps.len();
        let mut steps: Vec<StepSummary> = Vec::with_capacity(total);
        let mut failed = false;
        let mut cancelled = false;
        let mut cancel_marked = false;
        let mut artifact: Option<ArtifactRecord> = None;

        state.begin_packaging()?;
        state.write_to_run_dir(run_dir)?;

        for step in &plan.steps {
            let is_cleanup = step.is_cleanup();

            if !is_cleanup {
                if self.is_cancelled() {
                    cancelled = true;
                }
                if cancelled {
                    if cancel_marked {
                        steps.push(StepSummary::skipped(step.index, step.call.action));
                    } else {
                        steps.push(StepSummary::cancelled(step.index, step.call.action));
                        cancel_marked = true;
                    }
                    continue;
                }
                if failed {
                    steps.push(StepSummary::skipped(step.index, step.call.action));
                    continue;
                }
            } else if cancelled {
                // Cleanup must run after cancellation; stop killing children
                self.cancel.store(false, Ordering::SeqCst);
            }

            if step.call.action == ActionKind::Crashlytics {
                state.begin_uploading()?;
                state.write_to_run_dir(run_dir)?;
            }

            eprintln!("[{}/{}] {}", step.index, total, step.call.action);

            match self.runner.run(&step.call) {
                Ok(outcome) => {
                    if step.call.action == ActionKind::BuildApp {
                        match ArtifactRecord::from_file(&plan.artifact_path) {
                            Ok(record) => {
                                tracing::info!(
                                    path = %plan.artifact_path.display(),
                                    sha256 = %record.sha256,
                                    size_bytes = record.size_bytes,
                                    "artifact verified"
                                );
                                artifact = Some(record);
                                steps.push(StepSummary::success(
                                    step.index,
                                    step.call.action,
                                    outcome.duration_ms,
                                    outcome.log_path,
                                ));
                            }
                            Err(e) => {
                                failed = true;
                                let message = format!(
                                    "expected artifact missing after build: {}: {e}",
                                    plan.artifact_path.display()
                                );
                                eprintln!("    {message}");
                                steps.push(StepSummary::failure(
                                    step.index,
                                    step.call.action,
                                    FailureKind::Build,
                                    message,
                                    Some(outcome.exit_code),
                                    outcome.duration_ms,
                                    outcome.log_path,
                                ));
                            }
                        }
                    } else {
                        steps.push(StepSummary::success(
                            step.index,
                            step.call.action,
                            outcome.duration_ms,
                            outcome.log_path,
                        ));
                    }
                }
                Err(ActionError::Failed {
                    status,
                    exit_code,
                    log_path,
                    ..
                }) if status == "cancelled" => {
                    cancelled = true;
                    cancel_marked = true;
                    let mut summary = StepSummary::cancelled(step.index, step.call.action);
                    summary.tool_exit_code = exit_code;
                    summary.log = log_path;
                    steps.push(summary);
                }
                Err(ActionError::Failed {
                    status,
                    exit_code,
                    log_path,
                    ..
                }) => {
                    failed = true;
                    let kind = FailureKind::for_action(step.call.action, is_cleanup);
                    let message = format!("{} failed with {status}", step.call.action);
                    eprintln!("    {message}");
                    tracing::warn!(
                        step = step.index,
                        action = %step.call.action,
                        %status,
                        "step failed"
                    );
                    steps.push(StepSummary::failure(
                        step.index,
                        step.call.action,
                        kind,
                        message,
                        exit_code,
                        0,
                        log_path,
                    ));
                }
                Err(err) => {
                    // Spawn and log IO failures point at the host environment
                    failed = true;
                    let message = err.to_string();
                    eprintln!("    {message}");
                    tracing::warn!(
                        step = step.index,
                        action = %step.call.action,
                        "step failed to start"
                    );
                    steps.push(StepSummary::failure(
                        step.index,
                        step.call.action,
                        FailureKind::Environment,
                        message,
                        None,
                        0,
                        None,
                    ));
                }
            }
        }

        if cancelled {
            state.cancel()?;
        } else if failed {
            state.fail()?;
        } else {
            state.succeed()?;
        }
        state.write_to_run_dir(run_dir)?;

        let mut summary = LaneSummary::from_steps(
            plan.run_id.clone(),
            plan.app.clone(),
            plan.lane.clone(),
            plan.variant.clone(),
            steps,
            started.elapsed().as_millis() as u64,
        );
        if let Some(record) = artifact {
            summary = summary.with_artifact(record);
        }
        if let Some(digest) = config_digest {
            summary = summary.with_config_digest(digest.to_string());
        }
        summary.write_to_file(&run_dir.join("lane_summary.json"))?;

        tracing::info!(
            run_id = %plan.run_id,
            status = ?summary.status,
            exit_code = summary.exit_code,
            "lane run finished"
        );

        Ok(summary)
    }
}
