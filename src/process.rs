//! External command execution.
//!
//! A small builder over [`std::process::Command`] that captures output and
//! turns a non-zero exit into an error carrying the tool's stderr.
//!
//! ```rust,ignore
//! use sif_builder::process::Cmd;
//!
//! Cmd::new("mksquashfs")
//!     .arg_path(rootfs)
//!     .arg_path(output)
//!     .arg("-noappend")
//!     .error_msg("mksquashfs failed")
//!     .run()?;
//! ```

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Errors produced by [`Cmd::run`].
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// The program could not be started at all.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully.
    #[error("{message} ({program} exited with {status}){}", stderr_suffix(.stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        message: String,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Command builder.
#[derive(Debug)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
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

    /// Append a path argument without lossy UTF-8 conversion.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    /// Message used when the command exits unsuccessfully.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the output even when the exit status is non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Rendered command line, for logging.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, blocking the calling thread. There is no timeout.
    pub fn run(self) -> Result<CmdOutput, CmdError> {
        let program = self.program.to_string_lossy().into_owned();
        tracing::debug!(command = %self.display(), "running");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| CmdError::Spawn {
                program: program.clone(),
                source,
            })?;

        let result = CmdOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            return Err(CmdError::Failed {
                message: self
                    .error_msg
                    .unwrap_or_else(|| format!("{program} failed")),
                program,
                status: result.status,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

/// Whether `program` resolves on PATH.
pub fn exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Effective user id of this process.
pub fn effective_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}
