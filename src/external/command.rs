// src/external/command.rs
//
// Bounded-time subprocess runner shared by every command-backed collaborator.
// One shot, no retry: the child either exits within its budget or is killed.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Most stderr kept for diagnostics.
const STDERR_LIMIT: usize = 4096;

/// An external program invocation: binary, fixed leading arguments, time budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("i/o with '{program}' failed: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `spec` with `extra_args` appended, feeding `stdin` if given.
///
/// A non-zero exit is an error; stdout is only returned on success.
pub fn run_command(
    spec: &CommandSpec,
    extra_args: &[String],
    stdin: Option<&[u8]>,
) -> Result<CommandOutput, CommandError> {
    let program = spec.program.clone();
    let io_err = |source: io::Error| CommandError::Io {
        program: program.clone(),
        source,
    };

    debug!(program = %spec.program, timeout_ms = spec.timeout.as_millis() as u64, "spawning");
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra_args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    // Pipes are drained on their own threads so a chatty child cannot block on a full pipe
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || -> io::Result<()> {
                let result = pipe.write_all(&input);
                drop(pipe);
                match result {
                    // Child may exit without reading everything
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            }))
        }
        _ => None,
    };
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = match wait_with_deadline(&mut child, spec.timeout).map_err(io_err)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            // Pipe threads are left detached: a grandchild that inherited the pipes
            // can keep them open long after the child is gone, and joining would
            // wait for it. They end on their own once the last pipe holder exits.
            drop((writer, stdout_reader, stderr_reader));
            warn!(program = %spec.program, timeout_ms = spec.timeout.as_millis() as u64, "command timed out");
            return Err(CommandError::TimedOut {
                program: spec.program.clone(),
                timeout: spec.timeout,
            });
        }
    };

    if let Some(handle) = writer {
        join_io(handle).map_err(io_err)?;
    }
    let stdout = match stdout_reader {
        Some(handle) => join_io(handle).map_err(io_err)?,
        None => Vec::new(),
    };
    let stderr = match stderr_reader {
        Some(handle) => join_io(handle).map_err(io_err)?,
        None => Vec::new(),
    };

    if !status.success() {
        let mut text = String::from_utf8_lossy(&stderr).trim().to_string();
        if text.len() > STDERR_LIMIT {
            let mut cut = STDERR_LIMIT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        warn!(program = %spec.program, %status, "command failed");
        return Err(CommandError::Exit {
            program: spec.program.clone(),
            status,
            stderr: text,
        });
    }

    debug!(program = %spec.program, stdout = stdout.len(), "command finished");
    Ok(CommandOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_io<T>(handle: thread::JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .map_err(|_| io::Error::other("pipe thread panicked"))?
}

/// `Ok(None)` when the deadline passed with the child still running.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write an executable `sh` script into `dir` and return its path.
    pub fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }
}
