//! Dev-cycle orchestration: plan, implement, bounded review/test loop, ops.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::classifier::Classifier;
use crate::core::feedback::{FeedbackLoop, LoopAction};
use crate::core::types::{CycleStop, FIX_STEP_NAME, Role, StepRecord, Transcript, Verdict};
use crate::io::config::{DevCycleConfig, RoleNames};
use crate::io::invoker::AgentInvoker;
use crate::io::transcript_log::TranscriptLog;
use crate::step::{StepRunner, StepSettings};

/// Settings for one dev-cycle run.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub max_iterations: u32,
    pub step_timeout: Duration,
    pub output_limit_bytes: usize,
    pub log_path: PathBuf,
    pub roles: RoleNames,
}

impl From<&DevCycleConfig> for CycleConfig {
    fn from(cfg: &DevCycleConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            step_timeout: Duration::from_secs(cfg.step_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            log_path: cfg.log_path.clone(),
            roles: cfg.roles.clone(),
        }
    }
}

/// Result of a completed run, converged or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub transcript: Transcript,
    pub stop: CycleStop,
}

/// A hard error ended the run. Carries every step recorded before it.
#[derive(Debug)]
pub struct CycleAborted {
    pub transcript: Transcript,
    pub error: anyhow::Error,
}

impl fmt::Display for CycleAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dev cycle aborted after {} recorded step(s): {:#}",
            self.transcript.len(),
            self.error
        )
    }
}

impl std::error::Error for CycleAborted {}

/// Run one dev cycle for `goal`.
///
/// Steps run strictly in sequence: Planner, Implementer, then up to
/// `max_iterations` rounds of Reviewer/Tester with an implementer fix after
/// each failure, and finally Ops. Ops runs whether or not the loop converged.
/// `on_step` sees every recorded step with its verdict when one was taken.
#[instrument(skip_all, fields(max_iterations = config.max_iterations))]
pub fn run_dev_cycle<I, C, F>(
    goal: &str,
    invoker: &I,
    classifier: &C,
    config: &CycleConfig,
    mut on_step: F,
) -> Result<CycleOutcome, CycleAborted>
where
    I: AgentInvoker,
    C: Classifier,
    F: FnMut(&StepRecord, Option<Verdict>),
{
    let log = match TranscriptLog::create(&config.log_path) {
        Ok(log) => log,
        Err(error) => {
            return Err(CycleAborted {
                transcript: Transcript::new(goal),
                error,
            });
        }
    };
    let settings = StepSettings {
        roles: config.roles.clone(),
        timeout: config.step_timeout,
        output_limit_bytes: config.output_limit_bytes,
    };
    let mut runner = StepRunner::new(invoker, settings, log, goal);

    match drive(
        &mut runner,
        goal,
        classifier,
        config.max_iterations,
        &mut on_step,
    ) {
        Ok(stop) => {
            if let Err(error) = runner.log_mut().write_finished(stop) {
                return Err(CycleAborted {
                    transcript: runner.into_transcript(),
                    error,
                });
            }
            if stop.converged() {
                info!(%stop, "dev cycle finished");
            } else {
                warn!(%stop, "dev cycle finished without converging");
            }
            Ok(CycleOutcome {
                transcript: runner.into_transcript(),
                stop,
            })
        }
        Err(error) => {
            if let Err(log_err) = runner.log_mut().write_aborted(&error) {
                warn!(err = %log_err, "failed to record abort in transcript log");
            }
            Err(CycleAborted {
                transcript: runner.into_transcript(),
                error,
            })
        }
    }
}

fn drive<I, C, F>(
    runner: &mut StepRunner<'_, I>,
    goal: &str,
    classifier: &C,
    max_iterations: u32,
    on_step: &mut F,
) -> Result<CycleStop>
where
    I: AgentInvoker,
    C: Classifier,
    F: FnMut(&StepRecord, Option<Verdict>),
{
    runner.log_mut().write_header(goal, Utc::now())?;

    let planned = runner.run_step(Role::Planner.step_name(), Role::Planner, goal)?;
    on_step(&planned, None);
    let implemented = runner.run_step(Role::Implementer.step_name(), Role::Implementer, goal)?;
    on_step(&implemented, None);

    let mut feedback = FeedbackLoop::new(max_iterations);
    // Output of the last failed review or test, fed to the next fix.
    let mut failure_output = String::new();
    let mut action = feedback.start();
    let stop = loop {
        action = match action {
            LoopAction::Finish(stop) => break stop,
            LoopAction::Review => {
                let (record, verdict) = judged_step(runner, classifier, Role::Reviewer, goal)?;
                info!(iteration = feedback.iteration(), %verdict, "review judged");
                on_step(&record, Some(verdict));
                failure_output = record.output;
                feedback.after_review(verdict)
            }
            LoopAction::Test => {
                let (record, verdict) = judged_step(runner, classifier, Role::Tester, goal)?;
                info!(iteration = feedback.iteration(), %verdict, "test judged");
                on_step(&record, Some(verdict));
                failure_output = record.output;
                feedback.after_test(verdict)
            }
            LoopAction::Fix { after } => {
                info!(iteration = feedback.iteration(), failed = %after, "fixing");
                let fixed = runner.run_step(FIX_STEP_NAME, Role::Implementer, &failure_output)?;
                on_step(&fixed, None);
                feedback.after_fix()
            }
        };
    };

    let ops = runner.run_step(Role::Ops.step_name(), Role::Ops, goal)?;
    on_step(&ops, None);
    Ok(stop)
}

fn judged_step<I: AgentInvoker, C: Classifier>(
    runner: &mut StepRunner<'_, I>,
    classifier: &C,
    role: Role,
    goal: &str,
) -> Result<(StepRecord, Verdict)> {
    let record = runner.run_step(role.step_name(), role, goal)?;
    let verdict = classifier.classify(&record.output);
    Ok((record, verdict))
}
