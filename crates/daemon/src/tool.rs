//! Synchronous external tool invocation.
//!
//! Every call to ffprobe/ffmpeg goes through [`ToolRunner`], which spawns the
//! program, waits for it to exit and captures its exit code and output. There
//! is no timeout: a tool that hangs blocks the pass until it exits.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Number of trailing stderr lines kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Error type for tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all.
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    /// The program ran and exited with a non-zero status.
    #[error("{description} failed with exit code {code}: {stderr}")]
    Failed {
        description: String,
        code: i32,
        stderr: String,
    },

    /// The program was killed before it could exit.
    #[error("{description} was terminated by a signal")]
    Terminated { description: String },
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    description: String,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Human readable label used in logs and errors.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Arguments as strings, for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Builds the process command. Stdin is closed so ffmpeg never waits on the terminal.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }
}

/// Exit code and captured streams of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Turns a non-zero exit into a [`ToolError`].
    pub fn check(self, invocation: &ToolInvocation) -> Result<Self, ToolError> {
        match self.code {
            Some(0) => Ok(self),
            Some(code) => Err(ToolError::Failed {
                description: invocation.description().to_string(),
                code,
                stderr: stderr_tail(&self.stderr),
            }),
            None => Err(ToolError::Terminated {
                description: invocation.description().to_string(),
            }),
        }
    }
}

/// Last few lines of a tool's stderr, lossily decoded.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Runs external tools to completion.
pub trait ToolRunner {
    /// Spawns the invocation, blocks until it exits and returns what it produced.
    ///
    /// A non-zero exit is not an error here; callers decide via [`ToolOutput::check`].
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;

    /// Runs the invocation and fails on a non-zero exit.
    fn run_checked(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.run(invocation)?.check(invocation)
    }
}

/// Runs tools as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(
            "Executing {}: {} {:?}",
            invocation.description(),
            invocation.program().display(),
            invocation.args_lossy()
        );

        let output = invocation
            .to_command()
            .output()
            .map_err(|source| ToolError::Spawn {
                program: invocation.program().display().to_string(),
                source,
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
