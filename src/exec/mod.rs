//! Target executors
//!
//! The core treats the container runtime as an opaque capability: run a
//! command inside the target, probe readiness. Docker and Kubernetes
//! implementations shell out to the respective CLIs with a deadline; the
//! child is killed once the time budget is exhausted.

pub mod docker;
pub mod kubernetes;

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{VaultError, VaultResult};

pub use docker::DockerExecutor;
pub use kubernetes::KubernetesExecutor;

/// Poll interval while waiting on a child process
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output of a command run inside the target
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability to run commands inside a backup/restore target
pub trait TargetExecutor {
    /// Run `argv` inside `target` with optional stdin data and extra
    /// environment variables
    fn run(
        &self,
        target: &str,
        argv: &[String],
        stdin: Option<&str>,
        env: &[(String, String)],
    ) -> VaultResult<ExecOutput>;

    /// Check whether the target exists and is running
    fn is_ready(&self, target: &str) -> VaultResult<bool>;
}

/// Run a prepared command with a deadline, killing the child on overrun
///
/// Stdout/stderr are drained on separate threads so a chatty child can't
/// deadlock on a full pipe; stdin is fed the same way.
pub(crate) fn run_with_deadline(
    mut command: Command,
    stdin_data: Option<&str>,
    timeout: Duration,
    operation: &str,
) -> VaultResult<ExecOutput> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| VaultError::Target(format!("Failed to spawn {}: {}", operation, e)))?;

    if let Some(data) = stdin_data {
        let data = data.to_string();
        if let Some(mut stdin) = child.stdin.take() {
            std::thread::spawn(move || {
                let _ = stdin.write_all(data.as_bytes());
            });
        }
    } else {
        drop(child.stdin.take());
    }

    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    let status = wait_with_deadline(&mut child, timeout, operation)?;

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(ExecOutput {
        exit_code: status,
        stdout,
        stderr,
    })
}

fn spawn_pipe_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut output = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut output);
        }
        output
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration, operation: &str) -> VaultResult<i32> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code().unwrap_or(-1)),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VaultError::Timeout {
                        operation: operation.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(WAIT_POLL_INTERVAL);
            }
            Err(e) => {
                return Err(VaultError::Target(format!(
                    "Failed waiting on {}: {}",
                    operation, e
                )))
            }
        }
    }
}
