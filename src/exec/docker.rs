//! Docker target executor
//!
//! Runs commands inside a container via `docker exec`. Extra environment
//! variables are forwarded with `-e` flags so the daemon injects them into
//! the exec session rather than into our own process.

use std::process::Command;
use std::time::Duration;

use crate::error::{VaultError, VaultResult};
use crate::exec::{run_with_deadline, ExecOutput, TargetExecutor};

/// Time budget for readiness probes, independent of the dump budget
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Executor backed by the `docker` CLI
pub struct DockerExecutor {
    timeout: Duration,
}

impl DockerExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl TargetExecutor for DockerExecutor {
    fn run(
        &self,
        target: &str,
        argv: &[String],
        stdin: Option<&str>,
        env: &[(String, String)],
    ) -> VaultResult<ExecOutput> {
        let mut command = Command::new("docker");
        command.arg("exec");
        if stdin.is_some() {
            command.arg("-i");
        }
        for (key, value) in env {
            command.arg("-e").arg(format!("{}={}", key, value));
        }
        command.arg(target);
        command.args(argv);

        let operation = format!("docker exec {}", argv.first().map(String::as_str).unwrap_or(""));
        run_with_deadline(command, stdin, self.timeout, &operation)
    }

    fn is_ready(&self, target: &str) -> VaultResult<bool> {
        let mut command = Command::new("docker");
        command.args(["inspect", "-f", "{{.State.Running}}", target]);

        let output = run_with_deadline(command, None, PROBE_TIMEOUT, "docker inspect")?;
        if !output.success() {
            // Unknown container names surface as an inspect failure
            if output.stderr.contains("No such") {
                return Ok(false);
            }
            return Err(VaultError::Target(format!(
                "docker inspect failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim() == "true")
    }
}
