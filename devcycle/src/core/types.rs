//! Shared types for the dev-cycle core.
//!
//! These types define the contracts between the step runner, the classifier,
//! and the orchestrator. They carry no I/O and serialize deterministically.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External agent profile invoked by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Implementer,
    Reviewer,
    Tester,
    Ops,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Planner,
        Role::Implementer,
        Role::Reviewer,
        Role::Tester,
        Role::Ops,
    ];

    /// Default profile name passed to the agent tool (`copilot /agent <name>`).
    pub fn default_name(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Implementer => "implementer",
            Role::Reviewer => "reviewer",
            Role::Tester => "tester",
            Role::Ops => "ops",
        }
    }

    /// Human-readable step name used in the transcript.
    pub fn step_name(self) -> &'static str {
        match self {
            Role::Planner => "Planner",
            Role::Implementer => "Implementer",
            Role::Reviewer => "Reviewer",
            Role::Tester => "Tester",
            Role::Ops => "Ops",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

/// Step name for an implementer run that attempts to fix reported failures.
pub const FIX_STEP_NAME: &str = "Implementer (fixes)";

/// Pass/fail verdict derived from a step's captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// One executed step. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the transcript (1-indexed).
    pub index: usize,
    pub name: String,
    pub role: Role,
    /// Command line invoked, without the prompt text.
    pub command: String,
    /// Prompt text handed to the role (goal or feedback).
    pub input: String,
    /// Combined stdout/stderr of the agent process.
    pub output: String,
    /// Exit code reported by the agent process. Recorded, never classified.
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Ordered, append-only record of one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub goal: String,
    steps: Vec<StepRecord>,
}

impl Transcript {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    /// Most recent step with the given name, if any.
    pub fn last_named(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().rev().find(|step| step.name == name)
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.steps.iter().filter(|step| step.name == name).count()
    }
}

/// How the review/test feedback loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleStop {
    /// Reviewer and tester both passed within the iteration budget.
    Converged { iterations: u32 },
    /// The iteration budget ran out before a passing review and test.
    Exhausted { iterations: u32 },
}

impl CycleStop {
    pub fn iterations(self) -> u32 {
        match self {
            CycleStop::Converged { iterations } | CycleStop::Exhausted { iterations } => iterations,
        }
    }

    pub fn converged(self) -> bool {
        matches!(self, CycleStop::Converged { .. })
    }
}

impl fmt::Display for CycleStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStop::Converged { iterations } => {
                write!(f, "converged after {iterations} iteration(s)")
            }
            CycleStop::Exhausted { iterations } => {
                write!(f, "exhausted after {iterations} iteration(s)")
            }
        }
    }
}
