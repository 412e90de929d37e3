//! Invoker abstraction for external agent roles.
//!
//! The [`AgentInvoker`] trait decouples orchestration from the agent backend
//! (currently `copilot /agent <role>`). Tests use scripted invokers that return
//! predetermined outputs without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::run_command_combined;

/// Parameters for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Profile name passed to the agent tool.
    pub role_name: String,
    /// Prompt arguments, forwarded verbatim.
    pub args: Vec<String>,
    /// Maximum time to wait for the agent to exit.
    pub timeout: Duration,
    /// Combined output kept beyond this many bytes is dropped.
    pub output_limit_bytes: usize,
}

/// What an agent process produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Combined stdout and stderr.
    pub output: String,
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Abstraction over agent backends.
pub trait AgentInvoker {
    /// Command line for `request`, without the prompt arguments.
    fn describe(&self, request: &InvokeRequest) -> String;

    /// Run the agent and wait for it to exit.
    ///
    /// A non-zero exit is not an error. Failing to start the process must be
    /// reported as a [`crate::io::process::SpawnError`].
    fn invoke(&self, request: &InvokeRequest) -> Result<Invocation>;
}

/// Invoker that spawns the configured agent CLI (`copilot /agent <role> ...`).
#[derive(Debug, Clone)]
pub struct CopilotInvoker {
    agent: AgentConfig,
}

impl CopilotInvoker {
    pub fn new(agent: AgentConfig) -> Self {
        Self { agent }
    }

    /// Build the process command: program, subcommand, role, args, extra args.
    pub fn command(&self, role_name: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.agent.program);
        if !self.agent.subcommand.is_empty() {
            cmd.arg(&self.agent.subcommand);
        }
        cmd.arg(role_name).args(args).args(&self.agent.extra_args);
        cmd
    }

    /// Program, subcommand and role name joined for display.
    pub fn command_line(&self, role_name: &str) -> String {
        let mut parts = vec![self.agent.program.as_str()];
        if !self.agent.subcommand.is_empty() {
            parts.push(self.agent.subcommand.as_str());
        }
        parts.push(role_name);
        parts.join(" ")
    }
}

impl AgentInvoker for CopilotInvoker {
    fn describe(&self, request: &InvokeRequest) -> String {
        self.command_line(&request.role_name)
    }

    #[instrument(skip_all, fields(role = %request.role_name, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<Invocation> {
        info!(program = %self.agent.program, "invoking agent");
        let cmd = self.command(&request.role_name, &request.args);
        let output = run_command_combined(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {}", self.describe(request)))?;

        if output.timed_out {
            warn!("agent timed out");
        } else if !output.status.success() {
            // Exit status is recorded but never used to judge the step.
            warn!(exit_code = ?output.status.code(), "agent exited unsuccessfully");
        } else {
            debug!("agent completed");
        }

        Ok(Invocation {
            output: output.combined_text(),
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            timed_out: output.timed_out,
        })
    }
}
