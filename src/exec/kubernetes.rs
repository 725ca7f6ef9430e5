//! Kubernetes target executor
//!
//! Runs commands inside a pod via `kubectl exec`. kubectl has no flag for
//! per-exec environment variables, so when any are requested the command is
//! wrapped in `sh -c` with leading exports.

use std::process::Command;
use std::time::Duration;

use crate::error::{VaultError, VaultResult};
use crate::exec::{run_with_deadline, ExecOutput, TargetExecutor};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Executor backed by the `kubectl` CLI
pub struct KubernetesExecutor {
    namespace: String,
    container: Option<String>,
    timeout: Duration,
}

impl KubernetesExecutor {
    pub fn new(namespace: impl Into<String>, container: Option<String>, timeout_secs: u64) -> Self {
        Self {
            namespace: namespace.into(),
            container,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl TargetExecutor for KubernetesExecutor {
    fn run(
        &self,
        target: &str,
        argv: &[String],
        stdin: Option<&str>,
        env: &[(String, String)],
    ) -> VaultResult<ExecOutput> {
        let mut command = Command::new("kubectl");
        command.args(["exec", "-n", &self.namespace]);
        if stdin.is_some() {
            command.arg("-i");
        }
        command.arg(target);
        if let Some(container) = &self.container {
            command.arg("-c").arg(container);
        }
        command.arg("--");

        if env.is_empty() {
            command.args(argv);
        } else {
            let exports: Vec<String> = env
                .iter()
                .map(|(key, value)| format!("export {}={}", key, shell_quote(value)))
                .collect();
            let quoted: Vec<String> = argv.iter().map(|arg| shell_quote(arg)).collect();
            let script = format!("{} && exec {}", exports.join(" && "), quoted.join(" "));
            command.args(["sh", "-c", &script]);
        }

        let operation = format!(
            "kubectl exec {}",
            argv.first().map(String::as_str).unwrap_or("")
        );
        run_with_deadline(command, stdin, self.timeout, &operation)
    }

    fn is_ready(&self, target: &str) -> VaultResult<bool> {
        let mut command = Command::new("kubectl");
        command.args([
            "get",
            "pod",
            target,
            "-n",
            &self.namespace,
            "-o",
            "jsonpath={.status.phase}",
        ]);

        let output = run_with_deadline(command, None, PROBE_TIMEOUT, "kubectl get pod")?;
        if !output.success() {
            if output.stderr.contains("NotFound") {
                return Ok(false);
            }
            return Err(VaultError::Target(format!(
                "kubectl get pod failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim() == "Running")
    }
}

/// Single-quote a string for POSIX sh
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("pg_dump"), "'pg_dump'");
    }

    #[test]
    fn test_shell_quote_embedded_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
