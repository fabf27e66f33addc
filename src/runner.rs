//! Interpreter subprocesses
//!
//! Shell-backed resources hand a script to an interpreter on stdin and keep
//! everything the process produced in a [`CommandResults`]. System utilities
//! (`groupadd`, `useradd`, ...) go through [`run_capture`] instead.

use anyhow::{Context as _, Result};
use declarative::{Context, Interrupt};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_INTERPRETER: &str = "/bin/sh";

/// How often a running script is polled for exit
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Interpreters that understand `-n`
const SYNTAX_CHECKING_SHELLS: [&str; 5] = ["sh", "bash", "dash", "ksh", "zsh"];

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write script to {program}: {source}")]
    Stdin {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupt),
}

/// Everything one interpreter run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResults {
    /// What the run was for, e.g. `check` or `apply`
    pub op: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was killed by a signal
    pub exit_status: i32,
    pub state: Option<ExitStatus>,
}

impl CommandResults {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs scripts through an interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRunner {
    pub interpreter: PathBuf,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            dir: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ScriptRunner {
    pub fn new(interpreter: Option<&str>) -> Self {
        Self {
            interpreter: PathBuf::from(interpreter.unwrap_or(DEFAULT_INTERPRETER)),
            ..Self::default()
        }
    }

    fn program(&self) -> String {
        self.interpreter.display().to_string()
    }

    /// The interpreter's syntax-check flag, if it has one
    pub fn syntax_flag(&self) -> Option<&'static str> {
        let name = self.interpreter.file_name()?.to_str()?;
        SYNTAX_CHECKING_SHELLS.contains(&name).then_some("-n")
    }

    /// Parse `script` without running it
    ///
    /// Interpreters without a known syntax-check flag accept everything.
    pub fn check_syntax(&self, ctx: &Context, script: &str) -> Result<(), ExecError> {
        let Some(flag) = self.syntax_flag() else {
            log::debug!("{} has no syntax check, skipping", self.program());
            return Ok(());
        };
        let results = self.run(ctx, "syntax", script, &[flag.to_string()])?;
        if results.success() {
            Ok(())
        } else {
            Err(ExecError::Syntax(results.stderr.trim().to_string()))
        }
    }

    /// Run `script` with `flags`, recording the results under `op`
    ///
    /// On timeout or cancellation the process is killed and its output is
    /// abandoned.
    pub fn run(
        &self,
        ctx: &Context,
        op: &str,
        script: &str,
        flags: &[String],
    ) -> Result<CommandResults, ExecError> {
        ctx.check()?;

        let mut command = Command::new(&self.interpreter);
        command
            .args(flags)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        log::debug!("running {op} script with {} {}", self.program(), flags.join(" "));
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: self.program(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // fed from its own thread so the timeout covers a child that never reads
        let feeder = child.stdin.take().map(|mut stdin| {
            let script = script.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&script))
        });

        let state = self.wait(ctx, &mut child)?;
        // a script that exits without reading its stdin closes the pipe
        if let Some(Err(e)) = feeder.and_then(|h| h.join().ok())
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(ExecError::Stdin {
                program: self.program(),
                source: e,
            });
        }
        Ok(CommandResults {
            op: op.to_string(),
            stdin: script.to_string(),
            stdout: collect(stdout),
            stderr: collect(stderr),
            exit_status: state.code().unwrap_or(-1),
            state: Some(state),
        })
    }

    fn wait(&self, ctx: &Context, child: &mut Child) -> Result<ExitStatus, ExecError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(source) => {
                    kill(child);
                    return Err(ExecError::Wait {
                        program: self.program(),
                        source,
                    });
                }
            }

            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                log::warn!("{} timed out after {timeout:?}", self.program());
                kill(child);
                return Err(ExecError::TimedOut(timeout));
            }

            if let Err(interrupt) = ctx.sleep(WAIT_POLL) {
                kill(child);
                return Err(interrupt.into());
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // a read error truncates the capture
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("kill: {e}");
    }
    let _ = child.wait();
}

/// Run a command and capture stdout, failing with its stderr
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    log::info!("{cmd} {}", args.join(" "));
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{cmd} failed: {}", stderr.trim())
    }
}

/// Check if a command exists on `PATH` or at an absolute path
pub fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.is_absolute() {
        return path.is_file();
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(cmd).is_file())
    })
}
