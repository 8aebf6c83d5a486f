//! Running solver and pipeline subprocesses with timeouts and bounded output.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::dirs::ensure_dir;

/// Bytes kept from one output stream, plus how many were dropped past the limit.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Write a plain-text transcript (status, stdout, stderr) to `path`.
    pub fn write_log(&self, path: &Path, label: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let exit = match self.status.code() {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        };
        let mut buf = format!("# {label}\n# exit: {exit}\n# timed_out: {}\n", self.timed_out);
        for (stream, bytes, dropped) in [
            ("stdout", &self.stdout, self.stdout_truncated),
            ("stderr", &self.stderr, self.stderr_truncated),
        ] {
            buf.push_str(&format!("\n## {stream}\n"));
            buf.push_str(&String::from_utf8_lossy(bytes));
            if dropped > 0 {
                buf.push_str(&format!("\n[{label} {stream} truncated {dropped} bytes]\n"));
            }
        }
        fs::write(path, buf).with_context(|| format!("write log {}", path.display()))
    }
}

/// Run `cmd` to completion or until `timeout`, whichever comes first.
///
/// Both pipes are drained on reader threads while the child runs, keeping at
/// most `output_limit_bytes` of each. A spawn failure is an error; a non-zero
/// exit or a timeout is reported in [`CommandOutput`].
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "failed to spawn command");
        anyhow::Error::new(err).context(format!("spawn {:?}", cmd.get_program()))
    })?;
    debug!(pid = child.id(), "child process started");

    let stdout = capture(child.stdout.take(), output_limit_bytes);
    let stderr = capture(child.stderr.take(), output_limit_bytes);
    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    let stdout = collect(stdout).context("collect stdout")?;
    let stderr = collect(stderr).context("collect stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_truncated = stdout.dropped,
            stderr_truncated = stderr.dropped,
            "output truncated"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.dropped,
        stderr_truncated: stderr.dropped,
        timed_out,
    })
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait for killed command")?;
    Ok((status, true))
}

type Reader = Option<thread::JoinHandle<Result<Captured>>>;

fn capture<R: Read + Send + 'static>(stream: Option<R>, limit: usize) -> Reader {
    stream.map(|stream| thread::spawn(move || drain_bounded(stream, limit)))
}

fn collect(reader: Reader) -> Result<Captured> {
    match reader {
        None => Ok(Captured::default()),
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))?,
    }
}

/// Read `stream` to EOF, keeping the first `limit` bytes.
fn drain_bounded<R: Read>(mut stream: R, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
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
    fn captures_output_and_truncates() {
        let out = run_command_with_timeout(sh("printf 'abcdef'; echo err >&2"), Duration::from_secs(5), 3)
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout, b"abc");
        assert_eq!(out.stdout_truncated, 3);
        assert_eq!(out.stderr, b"err");
    }

    #[test]
    fn non_zero_exit_is_not_an_error() {
        let out = run_command_with_timeout(sh("exit 3"), Duration::from_secs(5), 100).expect("run");
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
    }

    #[test]
    fn timeout_kills_the_child() {
        let out = run_command_with_timeout(sh("sleep 5"), Duration::from_millis(100), 100)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run_command_with_timeout(
            Command::new("definitely-not-a-real-solver-binary"),
            Duration::from_secs(1),
            100,
        )
        .expect_err("spawn");
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn write_log_records_status_and_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = run_command_with_timeout(sh("echo hi"), Duration::from_secs(5), 100).expect("run");
        let log = temp.path().join("logs/solve.log");
        out.write_log(&log, "solver").expect("write log");
        let text = fs::read_to_string(&log).expect("read log");
        assert!(text.contains("# exit: 0"));
        assert!(text.contains("hi"));
    }
}
