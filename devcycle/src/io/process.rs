//! Running agent processes with a timeout and one combined, bounded output blob.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// The process could not be started at all (missing binary, permission denied).
#[derive(Debug, Error)]
#[error("spawn {program}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Stdout and stderr lines in arrival order.
    pub combined: Vec<u8>,
    /// Bytes dropped after `output_limit_bytes` was reached.
    pub truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Combined output as text, with a notice appended when bytes were dropped.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.combined).into_owned();
        if self.truncated > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]\n", self.truncated));
        }
        text
    }
}

#[derive(Default)]
struct Combined {
    buf: Vec<u8>,
    truncated: usize,
}

/// How long reader threads get to drain the pipes after the child was killed.
const READER_GRACE: Duration = Duration::from_secs(2);
/// Minimum drain time after a normal exit, even past the deadline.
const READER_FLOOR: Duration = Duration::from_millis(100);
const READER_POLL: Duration = Duration::from_millis(10);

/// Run a command with a timeout, capturing stdout and stderr into one buffer.
///
/// Both pipes are drained concurrently and appended line by line, so the
/// buffer follows the order in which lines arrived. The child's stdin is
/// closed. On Unix the child leads its own process group; on timeout the
/// whole group is killed and whatever it printed so far is returned with
/// `timed_out` set. Pipes still held open by a detached descendant are
/// abandoned once the deadline has passed.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes))]
pub fn run_command_combined(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let deadline = Instant::now() + timeout;
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(SpawnError {
                program: cmd.get_program().to_string_lossy().into_owned(),
                source: e,
            }
            .into());
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let shared = Arc::new(Mutex::new(Combined::default()));
    let stdout_shared = Arc::clone(&shared);
    let stderr_shared = Arc::clone(&shared);
    let stdout_handle =
        thread::spawn(move || read_lines_into(stdout, output_limit_bytes, &stdout_shared));
    let stderr_handle =
        thread::spawn(move || read_lines_into(stderr, output_limit_bytes, &stderr_shared));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let reader_deadline = if timed_out {
        Instant::now() + READER_GRACE
    } else {
        deadline.max(Instant::now() + READER_FLOOR)
    };
    collect_readers(
        [("stdout", stdout_handle), ("stderr", stderr_handle)],
        reader_deadline,
    )?;

    let combined = {
        let mut guard = shared
            .lock()
            .map_err(|_| anyhow!("output buffer lock poisoned"))?;
        std::mem::take(&mut *guard)
    };

    if combined.truncated > 0 {
        warn!(truncated = combined.truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        combined: combined.buf,
        truncated: combined.truncated,
        timed_out,
    })
}

/// Kill the child's process group, falling back to the child alone.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).context("child pid out of range")?;
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!(%err, "failed to kill process group, killing child only");
        child.kill().context("kill command")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Join reader threads that finish before `deadline`; detach the rest.
///
/// A reader still running at the deadline is blocked on a pipe some
/// descendant kept open. It is left behind and its later output is lost.
fn collect_readers<const N: usize>(
    handles: [(&'static str, thread::JoinHandle<Result<()>>); N],
    deadline: Instant,
) -> Result<()> {
    while Instant::now() < deadline && !handles.iter().all(|(_, h)| h.is_finished()) {
        thread::sleep(READER_POLL);
    }
    for (stream, handle) in handles {
        if !handle.is_finished() {
            warn!(stream, "output pipe still open after the process exited, abandoning it");
            continue;
        }
        match handle.join() {
            Ok(result) => result.with_context(|| format!("read {stream}"))?,
            Err(_) => bail!("{stream} reader thread panicked"),
        }
    }
    Ok(())
}

/// Append whole lines from `reader` to the shared buffer until EOF.
///
/// A line is held back until its newline (or EOF) arrives so lines from the
/// two streams never interleave. At most `limit` bytes of a pending line are
/// held; the rest, and everything past `limit` in the shared buffer, is
/// counted and discarded while the pipe keeps draining.
fn read_lines_into<R: Read>(reader: R, limit: usize, shared: &Mutex<Combined>) -> Result<()> {
    let mut reader = BufReader::with_capacity(8192, reader);
    let mut line = Vec::new();
    let mut dropped = 0usize;
    loop {
        let (consumed, line_done) = {
            let available = reader.fill_buf().context("read output")?;
            if available.is_empty() {
                break;
            }
            let (chunk, line_done) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let keep = chunk.len().min(limit.saturating_sub(line.len()));
            line.extend_from_slice(&chunk[..keep]);
            dropped += chunk.len() - keep;
            (chunk.len(), line_done)
        };
        reader.consume(consumed);
        if line_done {
            push_line(&mut line, &mut dropped, limit, shared)?;
        }
    }
    // Unterminated last line.
    push_line(&mut line, &mut dropped, limit, shared)
}

fn push_line(
    line: &mut Vec<u8>,
    dropped: &mut usize,
    limit: usize,
    shared: &Mutex<Combined>,
) -> Result<()> {
    if line.is_empty() && *dropped == 0 {
        return Ok(());
    }
    let mut combined = shared
        .lock()
        .map_err(|_| anyhow!("output buffer lock poisoned"))?;
    let keep = line.len().min(limit.saturating_sub(combined.buf.len()));
    combined.buf.extend_from_slice(&line[..keep]);
    combined.truncated += line.len() - keep + *dropped;
    line.clear();
    *dropped = 0;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr_together() {
        let output = run_command_combined(
            sh("echo out; echo err 1>&2; exit 3"),
            Duration::from_secs(10),
            10_000,
        )
        .expect("run");

        let text = output.combined_text();
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.timed_out);
    }

    #[test]
    fn sequential_writes_keep_arrival_order() {
        let output = run_command_combined(
            sh("echo first; sleep 0.2; echo second 1>&2; sleep 0.2; echo third"),
            Duration::from_secs(10),
            10_000,
        )
        .expect("run");
        assert_eq!(output.combined_text(), "first\nsecond\nthird\n");
    }

    #[test]
    fn output_beyond_limit_is_counted_not_kept() {
        let output =
            run_command_combined(sh("echo 0123456789"), Duration::from_secs(10), 4).expect("run");
        assert_eq!(output.combined, b"0123");
        assert_eq!(output.truncated, 7);
        assert!(output.combined_text().contains("[output truncated 7 bytes]"));
    }

    #[test]
    fn timeout_kills_child_and_keeps_partial_output() {
        let output = run_command_combined(
            sh("echo started; exec sleep 5"),
            Duration::from_millis(300),
            10_000,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(output.combined_text().contains("started"));
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let start = Instant::now();
        let output = run_command_combined(
            sh("echo started; sleep 4; echo late"),
            Duration::from_millis(300),
            10_000,
        )
        .expect("run");
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(output.timed_out);
        assert_eq!(output.combined_text(), "started\n");
    }

    #[test]
    fn background_process_holding_pipes_does_not_block_past_deadline() {
        let start = Instant::now();
        let output = run_command_combined(
            sh("(sleep 4 &); echo done"),
            Duration::from_millis(500),
            10_000,
        )
        .expect("run");
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!output.timed_out);
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(output.combined_text(), "done\n");
    }

    #[test]
    fn long_unterminated_output_is_capped() {
        let output = run_command_combined(
            sh("head -c 3000000 /dev/zero | tr '\\0' x"),
            Duration::from_secs(10),
            1000,
        )
        .expect("run");
        assert_eq!(output.combined.len(), 1000);
        assert_eq!(output.truncated, 2_999_000);
    }

    #[test]
    fn pending_line_is_held_to_the_limit() {
        let shared = Mutex::new(Combined::default());
        read_lines_into(std::io::repeat(b'x').take(8_000_000), 64, &shared).expect("read");
        let combined = shared.into_inner().expect("lock");
        assert_eq!(combined.buf, vec![b'x'; 64]);
        assert_eq!(combined.truncated, 8_000_000 - 64);
    }

    #[test]
    fn unterminated_last_line_is_kept() {
        let output =
            run_command_combined(sh("printf 'a\\nb'"), Duration::from_secs(10), 100)
                .expect("run");
        assert_eq!(output.combined_text(), "a\nb");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let err = run_command_combined(
            Command::new("devcycle-definitely-missing-binary"),
            Duration::from_secs(1),
            100,
        )
        .unwrap_err();
        let spawn = err.downcast_ref::<SpawnError>().expect("spawn error");
        assert_eq!(spawn.program, "devcycle-definitely-missing-binary");
        assert_eq!(spawn.source.kind(), std::io::ErrorKind::NotFound);
    }
}
