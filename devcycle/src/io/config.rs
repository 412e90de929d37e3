//! Dev-cycle configuration stored in `.devcycle/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::PASS_MARKERS;
use crate::core::types::Role;

pub const DEFAULT_CONFIG_PATH: &str = ".devcycle/config.toml";
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Dev-cycle configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults, and
/// a missing file is the same as an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevCycleConfig {
    /// Upper bound on review/test feedback iterations.
    pub max_iterations: u32,

    /// Wall-clock limit for a single agent invocation, in seconds.
    pub step_timeout_secs: u64,

    /// Combined agent output kept per step; the rest is dropped.
    pub output_limit_bytes: usize,

    /// Transcript log, truncated at the start of every run.
    pub log_path: PathBuf,

    /// Substrings that make reviewer/tester output count as passing.
    pub pass_markers: Vec<String>,

    pub agent: AgentConfig,

    pub roles: RoleNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable.
    pub program: String,
    /// Argument placed before the role name.
    pub subcommand: String,
    /// Arguments appended after the prompt.
    pub extra_args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "copilot".to_string(),
            subcommand: "/agent".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Profile names the agent tool knows each role by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleNames {
    pub planner: String,
    pub implementer: String,
    pub reviewer: String,
    pub tester: String,
    pub ops: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            planner: Role::Planner.default_name().to_string(),
            implementer: Role::Implementer.default_name().to_string(),
            reviewer: Role::Reviewer.default_name().to_string(),
            tester: Role::Tester.default_name().to_string(),
            ops: Role::Ops.default_name().to_string(),
        }
    }
}

impl RoleNames {
    pub fn name(&self, role: Role) -> &str {
        match role {
            Role::Planner => &self.planner,
            Role::Implementer => &self.implementer,
            Role::Reviewer => &self.reviewer,
            Role::Tester => &self.tester,
            Role::Ops => &self.ops,
        }
    }
}

impl Default for DevCycleConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            log_path: PathBuf::from(".devcycle/dev_cycle.log"),
            pass_markers: PASS_MARKERS.iter().map(|m| m.to_string()).collect(),
            agent: AgentConfig::default(),
            roles: RoleNames::default(),
        }
    }
}

impl DevCycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.step_timeout_secs == 0 {
            return Err(anyhow!("step_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        if self.pass_markers.iter().any(|m| m.is_empty()) {
            return Err(anyhow!("pass_markers must not contain empty strings"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must not be empty"));
        }
        for role in Role::ALL {
            if self.roles.name(role).trim().is_empty() {
                return Err(anyhow!(
                    "roles.{} must not be empty",
                    role.default_name()
                ));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DevCycleConfig::default()`.
pub fn load_config(path: &Path) -> Result<DevCycleConfig> {
    if !path.exists() {
        let cfg = DevCycleConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DevCycleConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Write the config unless it exists; `force` overwrites.
///
/// Returns whether the file was written.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    write_config(path, &DevCycleConfig::default())?;
    Ok(true)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DevCycleConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
