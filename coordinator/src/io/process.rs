//! Child process execution with bounded output capture.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};

/// Bytes kept from one output stream, plus how many were dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: u64,
}

impl Captured {
    fn render(&self, label: &str, out: &mut String) {
        out.push_str(&String::from_utf8_lossy(&self.bytes));
        if self.dropped > 0 {
            out.push_str(&format!("\n[{label} truncated {} bytes]\n", self.dropped));
        }
    }
}

/// Exit status and captured streams of a finished child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl CommandOutput {
    /// Stdout followed by stderr, lossily decoded, with truncation notices.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        self.stdout.render("stdout", &mut out);
        if !self.stderr.bytes.is_empty() && !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        self.stderr.render("stderr", &mut out);
        out
    }
}

/// Run `cmd` to completion with stdin closed.
///
/// Both pipes are drained on their own threads while the child runs, so a
/// chatty child never blocks on a full pipe. At most `output_limit_bytes` of
/// each stream is kept. `Err` means the child could not be started or waited
/// on; a nonzero exit is still `Ok`.
#[instrument(skip_all, fields(output_limit_bytes = output_limit_bytes))]
pub fn run_command(mut cmd: Command, output_limit_bytes: usize) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
        anyhow::Error::new(e).context("spawn command")
    })?;
    debug!(pid = child.id(), "child started");

    let limit = u64::try_from(output_limit_bytes).unwrap_or(u64::MAX);
    let stdout = capture(child.stdout.take(), "stdout", limit)?;
    let stderr = capture(child.stderr.take(), "stderr", limit)?;

    let status = child.wait().context("wait for command")?;
    let stdout = collect(stdout).context("collect stdout")?;
    let stderr = collect(stderr).context("collect stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output truncated"
        );
    }
    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn capture<R>(pipe: Option<R>, label: &str, limit: u64) -> Result<JoinHandle<io::Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe.ok_or_else(|| anyhow!("{label} was not piped"))?;
    thread::Builder::new()
        .name(format!("capture-{label}"))
        .spawn(move || read_bounded(pipe, limit))
        .with_context(|| format!("start {label} reader"))
}

fn collect(handle: JoinHandle<io::Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
        .context("read output")
}

/// Keep the first `limit` bytes, then drain and count the rest.
fn read_bounded<R: Read>(mut reader: R, limit: u64) -> io::Result<Captured> {
    let mut bytes = Vec::new();
    reader.by_ref().take(limit).read_to_end(&mut bytes)?;
    let dropped = io::copy(&mut reader, &mut io::sink())?;
    Ok(Captured { bytes, dropped })
}
