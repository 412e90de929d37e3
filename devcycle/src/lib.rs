//! Dev-cycle harness around an external agent CLI.
//!
//! A run sends a goal through Planner and Implementer roles, loops
//! Reviewer/Tester with implementer fixes for a bounded number of iterations,
//! then runs Ops, recording every step in an append-only transcript.
//!
//! - **[`core`]**: Pure, deterministic logic (classification, the feedback
//!   loop state machine, transcript types). No I/O.
//! - **[`io`]**: Side-effecting operations (process spawning, config, the
//!   transcript log). Isolated behind traits so tests can script the agent.
//!
//! [`step`] and [`cycle`] combine the two to implement `devcycle run`;
//! [`passthrough`] implements the single-role commands.

pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod passthrough;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
