//! Running external tools with their output captured in stage log files.
//!
//! The driver's own stdout/stderr are never redirected. Each child process
//! gets file handles cloned from a [`LogSink`], so "restoring" the console
//! after a failed invocation is simply dropping the sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument};

/// Solver log names inside a stage directory.
pub const SOLVER_STDOUT: &str = "log.out";
pub const SOLVER_STDERR: &str = "log.err";

/// Append-mode stdout/stderr log pair for one stage.
#[derive(Debug)]
pub struct LogSink {
    out_path: PathBuf,
    err_path: PathBuf,
    out: BufWriter<File>,
    err: BufWriter<File>,
}

impl LogSink {
    pub fn open(dir: &Path, out_name: &str, err_name: &str) -> Result<Self> {
        let out_path = dir.join(out_name);
        let err_path = dir.join(err_name);
        Ok(Self {
            out: BufWriter::new(open_append(&out_path)?),
            err: BufWriter::new(open_append(&err_path)?),
            out_path,
            err_path,
        })
    }

    /// The solver's `log.out` / `log.err` pair in `stage_dir`.
    pub fn solver(stage_dir: &Path) -> Result<Self> {
        Self::open(stage_dir, SOLVER_STDOUT, SOLVER_STDERR)
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn err_path(&self) -> &Path {
        &self.err_path
    }

    /// Separate invocations inside the shared logs.
    pub fn banner(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "=== {title} ===").context("write log banner")?;
        writeln!(self.err, "=== {title} ===").context("write log banner")?;
        Ok(())
    }

    /// Flush buffered lines and hand out handles a child can write to.
    pub fn child_stdio(&mut self) -> Result<(Stdio, Stdio)> {
        self.flush()?;
        let out = self.out.get_ref().try_clone().context("clone stdout log handle")?;
        let err = self.err.get_ref().try_clone().context("clone stderr log handle")?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.out_path.display()))?;
        self.err
            .flush()
            .with_context(|| format!("flush {}", self.err_path.display()))
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log {}", path.display()))
}

/// Run `cmd` to completion with stdin closed and output sent to `sink`.
#[instrument(skip_all, fields(program = %cmd.get_program().to_string_lossy()))]
pub fn run_logged(mut cmd: Command, sink: &mut LogSink) -> Result<ExitStatus> {
    let (stdout, stderr) = sink.child_stdio()?;
    cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

    debug!(log = %sink.out_path().display(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| {
                format!("spawn {}", cmd.get_program().to_string_lossy())
            });
        }
    };
    let status = child.wait().context("wait for command")?;
    debug!(exit_code = ?status.code(), "command finished");
    Ok(status)
}
