//! Opaque "run command, get exit code + stdout + stderr" primitive.

use std::{
        io::Write,
        path::PathBuf,
        process::{Command, Stdio},
};

use crate::error::Result;

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
        pub code: i32,
        pub stdout: String,
        pub stderr: String,
}

impl CommandOutput {
        /// Zero exit status.
        pub fn success(&self) -> bool {
                self.code == 0
        }

        /// Diagnostic text: stderr, falling back to stdout, trimmed.
        pub fn diagnostic(&self) -> String {
                let err = self.stderr.trim();
                if err.is_empty() { self.stdout.trim().to_string() } else { err.to_string() }
        }
}

/// Executes the version-control command-line tool.
///
/// `args` excludes the program name. `stdin`, when given, is written in full before waiting.
pub trait CommandRunner: Send + Sync {
        fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CommandOutput>;
}

/// Spawns a real child process per call.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
        program: PathBuf,
}

impl ProcessRunner {
        pub fn new(program: impl Into<PathBuf>) -> Self {
                Self { program: program.into() }
        }
}

impl Default for ProcessRunner {
        fn default() -> Self {
                Self::new("p4")
        }
}

impl CommandRunner for ProcessRunner {
        fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
                let mut command = Command::new(&self.program);
                command.args(args)
                        .stdout(Stdio::piped())
                        .stderr(Stdio::piped())
                        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
                let mut child = command.spawn()?;
                if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
                        pipe.write_all(text.as_bytes())?;
                        // pipe dropped here: child sees EOF
                }
                let output = child.wait_with_output()?;
                Ok(CommandOutput {
                        code: output.status.code().unwrap_or(-1),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
        }
}
