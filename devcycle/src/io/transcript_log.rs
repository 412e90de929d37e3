//! Append-only transcript log for a dev-cycle run.
//!
//! The file is truncated when a run starts and every section is written and
//! flushed as soon as its step completes, so a crash mid-run leaves a readable
//! prefix.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::core::types::{CycleStop, StepRecord};

pub struct TranscriptLog {
    path: PathBuf,
    file: File,
}

impl TranscriptLog {
    /// Create (or truncate) the log at `path`, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create log {}", path.display()))?;
        debug!(path = %path.display(), "transcript log opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn write_header(&mut self, goal: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.append(&render_header(goal, started_at))
    }

    pub fn append_step(&mut self, record: &StepRecord) -> Result<()> {
        self.append(&render_step(record))
    }

    pub fn write_finished(&mut self, stop: CycleStop) -> Result<()> {
        self.append(&format!("=== cycle finished: {stop} ===\n"))
    }

    pub fn write_aborted(&mut self, err: &anyhow::Error) -> Result<()> {
        self.append(&format!("=== cycle aborted: {err:#} ===\n"))
    }

    fn append(&mut self, text: &str) -> Result<()> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|()| self.file.flush())
            .with_context(|| format!("append to log {}", self.path.display()))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn render_header(goal: &str, started_at: DateTime<Utc>) -> String {
    format!(
        "=== dev cycle ===\ngoal: {goal}\nstarted: {}\n\n",
        timestamp(started_at)
    )
}

pub fn render_step(record: &StepRecord) -> String {
    let exit = record
        .exit_code
        .map_or_else(|| "none".to_string(), |code| code.to_string());
    let mut buf = format!(
        "=== [{}] {} ===\ncommand: {}\nstarted: {}\nended: {}\nexit: {exit}\n--- input ---\n{}\n--- output ---\n{}",
        record.index,
        record.name,
        record.command,
        timestamp(record.started_at),
        timestamp(record.ended_at),
        record.input,
        record.output,
    );
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push('\n');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn record(index: usize, name: &str, output: &str) -> StepRecord {
        let now = Utc::now();
        StepRecord {
            index,
            name: name.to_string(),
            role: Role::Reviewer,
            command: "copilot /agent reviewer".to_string(),
            input: "add health check".to_string(),
            output: output.to_string(),
            exit_code: None,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn step_section_lists_command_input_and_output() {
        let text = render_step(&record(2, "Reviewer", "No issues"));
        assert!(text.starts_with("=== [2] Reviewer ===\n"));
        assert!(text.contains("command: copilot /agent reviewer\n"));
        assert!(text.contains("exit: none\n"));
        assert!(text.contains("--- input ---\nadd health check\n"));
        assert!(text.ends_with("--- output ---\nNo issues\n\n"));
    }

    #[test]
    fn create_truncates_previous_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("logs").join("dev_cycle.log");
        {
            let mut log = TranscriptLog::create(&path).expect("create");
            log.append_step(&record(1, "Planner", "old run"))
                .expect("append");
        }

        let mut log = TranscriptLog::create(&path).expect("recreate");
        log.write_header("new goal", Utc::now()).expect("header");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(!contents.contains("old run"));
        assert!(contents.contains("goal: new goal"));
    }

    #[test]
    fn sections_are_visible_before_the_log_is_dropped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("dev_cycle.log");
        let mut log = TranscriptLog::create(&path).expect("create");
        log.append_step(&record(1, "Planner", "plan"))
            .expect("append");
        log.append_step(&record(2, "Implementer", "code"))
            .expect("append");

        let contents = fs::read_to_string(&path).expect("read");
        let planner = contents.find("[1] Planner").expect("planner section");
        let implementer = contents.find("[2] Implementer").expect("implementer section");
        assert!(planner < implementer);

        log.write_finished(CycleStop::Converged { iterations: 1 })
            .expect("footer");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with("=== cycle finished: converged after 1 iteration(s) ===\n"));
    }

    #[test]
    fn create_fails_when_parent_is_a_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").expect("write");
        let err = TranscriptLog::create(&blocker.join("dev_cycle.log"))
            .err()
            .expect("error");
        assert!(format!("{err:#}").contains("create log dir"));
    }
}
