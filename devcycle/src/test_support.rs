//! Test-only helpers: a scripted agent invoker and config builders.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::core::types::Role;
use crate::cycle::CycleConfig;
use crate::io::config::{AgentConfig, DevCycleConfig, RoleNames};
use crate::io::invoker::{AgentInvoker, InvokeRequest, Invocation};
use crate::io::process::SpawnError;
use crate::step::StepSettings;

/// One canned response from [`ScriptedInvoker`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Output {
        text: String,
        exit_code: Option<i32>,
    },
    /// Behave as if the agent binary could not be started.
    LaunchFailure,
    /// Behave as if the agent was killed after printing `partial`.
    Timeout { partial: String },
}

impl ScriptedReply {
    pub fn output(text: &str) -> Self {
        Self::output_with_exit(text, 0)
    }

    pub fn output_with_exit(text: &str, exit_code: i32) -> Self {
        Self::Output {
            text: text.to_string(),
            exit_code: Some(exit_code),
        }
    }
}

/// Replays queued replies per role name and records every request.
///
/// When a role's queue is empty the role's `always` text is returned, or
/// `"ok"` if none was set.
#[derive(Default)]
pub struct ScriptedInvoker {
    queues: RefCell<HashMap<String, VecDeque<ScriptedReply>>>,
    fallback: HashMap<String, String>,
    requests: RefCell<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for `role`, consumed in order.
    pub fn with_replies<T>(self, role: Role, replies: T) -> Self
    where
        T: IntoIterator<Item = ScriptedReply>,
    {
        self.queues
            .borrow_mut()
            .entry(role.default_name().to_string())
            .or_default()
            .extend(replies);
        self
    }

    /// Output returned for `role` once its queue is drained.
    pub fn always(mut self, role: Role, text: &str) -> Self {
        self.fallback
            .insert(role.default_name().to_string(), text.to_string());
        self
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.borrow().clone()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn describe(&self, request: &InvokeRequest) -> String {
        format!("scripted {}", request.role_name)
    }

    fn invoke(&self, request: &InvokeRequest) -> Result<Invocation> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .queues
            .borrow_mut()
            .get_mut(&request.role_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ScriptedReply::Output {
                text: self
                    .fallback
                    .get(&request.role_name)
                    .cloned()
                    .unwrap_or_else(|| "ok".to_string()),
                exit_code: Some(0),
            });

        match reply {
            ScriptedReply::Output { text, exit_code } => Ok(Invocation {
                output: text,
                exit_code,
                timed_out: false,
            }),
            ScriptedReply::LaunchFailure => Err(SpawnError {
                program: "scripted".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch failure"),
            }
            .into()),
            ScriptedReply::Timeout { partial } => Ok(Invocation {
                output: partial,
                exit_code: None,
                timed_out: true,
            }),
        }
    }
}

pub fn step_settings() -> StepSettings {
    StepSettings {
        roles: RoleNames::default(),
        timeout: Duration::from_secs(5),
        output_limit_bytes: 10_000,
    }
}

/// Cycle config logging to `<dir>/dev_cycle.log`.
pub fn cycle_config(dir: &Path, max_iterations: u32) -> CycleConfig {
    CycleConfig {
        max_iterations,
        step_timeout: Duration::from_secs(5),
        output_limit_bytes: 10_000,
        log_path: dir.join("dev_cycle.log"),
        roles: RoleNames::default(),
    }
}

/// Write a shell stand-in for the agent CLI and a config that runs it.
///
/// The script is run as `sh <script> <role> <prompt...>`, so `$1` is the role
/// name and `$2` the prompt. Returns the config path.
pub fn write_fake_agent(dir: &Path, script_body: &str) -> Result<std::path::PathBuf> {
    let script_path = dir.join("fake_agent.sh");
    fs::write(&script_path, script_body)?;
    let cfg = DevCycleConfig {
        log_path: dir.join("dev_cycle.log"),
        step_timeout_secs: 10,
        agent: AgentConfig {
            program: "sh".to_string(),
            subcommand: script_path.to_string_lossy().into_owned(),
            extra_args: Vec::new(),
        },
        ..DevCycleConfig::default()
    };
    let config_path = dir.join("config.toml");
    crate::io::config::write_config(&config_path, &cfg)?;
    Ok(config_path)
}

/// Scratch directory for tests that need files on disk.
pub fn scratch_dir() -> Result<tempfile::TempDir> {
    Ok(tempfile::tempdir()?)
}
