//! Thin single-role invocation: `devcycle review src/` runs `copilot /agent reviewer src/`.
//!
//! Stdio is inherited so the agent stays interactive, and the agent's exit
//! code becomes ours. Nothing is classified or logged to a transcript.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::Role;
use crate::exit_codes;
use crate::io::config::DevCycleConfig;
use crate::io::invoker::CopilotInvoker;
use crate::step::LaunchError;

/// Run `role` once with `args` forwarded verbatim; returns the agent's exit code.
#[instrument(skip_all, fields(role = ?role))]
pub fn run_role(cfg: &DevCycleConfig, role: Role, args: &[String]) -> Result<i32> {
    let invoker = CopilotInvoker::new(cfg.agent.clone());
    let role_name = cfg.roles.name(role);
    let mut cmd = invoker.command(role_name, args);

    let status = match cmd.status() {
        Ok(status) => status,
        Err(source) => {
            return Err(LaunchError {
                step: role.step_name().to_string(),
                command: invoker.command_line(role_name),
                source,
            }
            .into());
        }
    };
    debug!(exit_code = ?status.code(), "agent exited");
    // Killed by a signal: no code to forward.
    Ok(status.code().unwrap_or(exit_codes::INVALID))
}
