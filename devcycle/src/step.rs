//! Running and recording a single dev-cycle step.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::types::{Role, StepRecord, Transcript};
use crate::io::config::RoleNames;
use crate::io::invoker::{AgentInvoker, InvokeRequest};
use crate::io::process::SpawnError;
use crate::io::transcript_log::TranscriptLog;

/// The agent process for a step could not be started. Nothing was recorded.
#[derive(Debug, Error)]
#[error("step '{step}': failed to launch `{command}`")]
pub struct LaunchError {
    pub step: String,
    pub command: String,
    #[source]
    pub source: std::io::Error,
}

/// A step ran past its timeout and was killed. The step was recorded.
#[derive(Debug, Error)]
#[error("step '{step}' timed out after {}s", .timeout.as_secs())]
pub struct StepTimeoutError {
    pub step: String,
    pub timeout: Duration,
}

/// Per-step invocation limits.
#[derive(Debug, Clone)]
pub struct StepSettings {
    pub roles: RoleNames,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Executes steps one at a time and owns the run's transcript and log.
pub struct StepRunner<'a, I: AgentInvoker> {
    invoker: &'a I,
    settings: StepSettings,
    log: TranscriptLog,
    transcript: Transcript,
}

impl<'a, I: AgentInvoker> StepRunner<'a, I> {
    pub fn new(invoker: &'a I, settings: StepSettings, log: TranscriptLog, goal: &str) -> Self {
        Self {
            invoker,
            settings,
            log,
            transcript: Transcript::new(goal),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn log_mut(&mut self) -> &mut TranscriptLog {
        &mut self.log
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Invoke `role` with `input` as its prompt and record the result.
    ///
    /// The record is appended to the transcript and the log whatever the
    /// agent's exit status. Launch failures record nothing and return
    /// [`LaunchError`]; timeouts are recorded and then return
    /// [`StepTimeoutError`].
    #[instrument(skip_all, fields(step = name, role = ?role))]
    pub fn run_step(&mut self, name: &str, role: Role, input: &str) -> Result<StepRecord> {
        let request = InvokeRequest {
            role_name: self.settings.roles.name(role).to_string(),
            args: vec![input.to_string()],
            timeout: self.settings.timeout,
            output_limit_bytes: self.settings.output_limit_bytes,
        };
        let command = self.invoker.describe(&request);

        info!(%command, "step started");
        let started_at = Utc::now();
        let invocation = match self.invoker.invoke(&request) {
            Ok(invocation) => invocation,
            Err(err) => {
                return Err(match err.downcast::<SpawnError>() {
                    Ok(spawn) => LaunchError {
                        step: name.to_string(),
                        command,
                        source: spawn.source,
                    }
                    .into(),
                    Err(other) => other.context(format!("step '{name}'")),
                });
            }
        };
        let ended_at = Utc::now();

        let record = StepRecord {
            index: self.transcript.len() + 1,
            name: name.to_string(),
            role,
            command,
            input: input.to_string(),
            output: invocation.output,
            exit_code: invocation.exit_code,
            started_at,
            ended_at,
        };
        self.transcript.push(record.clone());
        self.log
            .append_step(&record)
            .with_context(|| format!("record step '{name}'"))?;

        if invocation.timed_out {
            warn!(timeout_secs = self.settings.timeout.as_secs(), "step timed out");
            return Err(StepTimeoutError {
                step: name.to_string(),
                timeout: self.settings.timeout,
            }
            .into());
        }

        info!(
            exit_code = ?record.exit_code,
            output_bytes = record.output.len(),
            "step finished"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedInvoker, ScriptedReply, step_settings};
    use std::fs;

    #[test]
    fn non_zero_exit_is_recorded_and_logged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("dev_cycle.log");
        let invoker = ScriptedInvoker::new().with_replies(
            Role::Tester,
            [ScriptedReply::output_with_exit("2 tests failed", 1)],
        );
        let log = TranscriptLog::create(&log_path).expect("log");
        let mut runner = StepRunner::new(&invoker, step_settings(), log, "goal");

        let record = runner
            .run_step("Tester", Role::Tester, "goal")
            .expect("step");
        assert_eq!(record.index, 1);
        assert_eq!(record.exit_code, Some(1));
        assert_eq!(record.output, "2 tests failed");
        assert_eq!(record.command, "scripted tester");
        assert_eq!(runner.transcript().len(), 1);

        let contents = fs::read_to_string(&log_path).expect("read log");
        assert!(contents.contains("=== [1] Tester ==="));
        assert!(contents.contains("exit: 1"));
        assert!(contents.contains("2 tests failed"));
    }

    #[test]
    fn launch_failure_records_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("dev_cycle.log");
        let invoker =
            ScriptedInvoker::new().with_replies(Role::Planner, [ScriptedReply::LaunchFailure]);
        let log = TranscriptLog::create(&log_path).expect("log");
        let mut runner = StepRunner::new(&invoker, step_settings(), log, "goal");

        let err = runner
            .run_step("Planner", Role::Planner, "goal")
            .unwrap_err();
        let launch = err.downcast_ref::<LaunchError>().expect("launch error");
        assert_eq!(launch.step, "Planner");
        assert_eq!(launch.command, "scripted planner");
        assert!(runner.transcript().is_empty());
        assert_eq!(fs::read_to_string(&log_path).expect("read log"), "");
    }

    #[test]
    fn timeout_is_recorded_then_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invoker = ScriptedInvoker::new().with_replies(
            Role::Implementer,
            [ScriptedReply::Timeout {
                partial: "half done".to_string(),
            }],
        );
        let log = TranscriptLog::create(&temp.path().join("log")).expect("log");
        let mut runner = StepRunner::new(&invoker, step_settings(), log, "goal");

        let err = runner
            .run_step("Implementer", Role::Implementer, "goal")
            .unwrap_err();
        assert!(err.downcast_ref::<StepTimeoutError>().is_some());
        let recorded = runner.transcript().steps();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].output, "half done");
        assert_eq!(recorded[0].exit_code, None);
    }

    #[test]
    fn request_uses_configured_role_name_and_input() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invoker = ScriptedInvoker::new();
        let mut settings = step_settings();
        settings.roles.reviewer = "code-review".to_string();
        let log = TranscriptLog::create(&temp.path().join("log")).expect("log");
        let mut runner = StepRunner::new(&invoker, settings, log, "goal");

        runner
            .run_step("Reviewer", Role::Reviewer, "feedback text")
            .expect("step");
        let requests = invoker.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].role_name, "code-review");
        assert_eq!(requests[0].args, vec!["feedback text".to_string()]);
    }
}
