//! Verdict actions.
//!
//! Each evaluated address results in at most one external command, chosen by
//! verdict. Failures are logged and never retried.

use crate::checkers::Verdict;
use crate::config::{Settings, IP_PLACEHOLDER};
use crate::error::ActionError;
use async_trait::async_trait;
use std::net::IpAddr;
use std::process::{ExitStatus, Stdio};
use tracing::{debug, error, info};

/// Runs a rendered command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<ExitStatus, ActionError>;
}

/// Spawns commands as child processes. Standard output is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<ExitStatus, ActionError> {
        let (program, args) = argv.split_first().ok_or(ActionError::EmptyCommand)?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ActionError::Spawn {
                command: argv.join(" "),
                source,
            })?;

        if !output.stderr.is_empty() {
            debug!(
                command = %argv.join(" "),
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "Command wrote to stderr"
            );
        }

        Ok(output.status)
    }
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No command configured for this verdict.
    Skipped,
    /// The command ran and exited successfully.
    Executed(Vec<String>),
    /// The command could not be run or exited non-zero.
    Failed,
}

/// Maps verdicts to command templates and runs them.
pub struct ActionDispatcher {
    legit_cmd: String,
    malicious_cmd: String,
    runner: Box<dyn CommandRunner>,
}

impl ActionDispatcher {
    pub fn new(legit_cmd: impl Into<String>, malicious_cmd: impl Into<String>) -> Self {
        Self::with_runner(legit_cmd, malicious_cmd, Box::new(ProcessRunner))
    }

    pub fn with_runner(
        legit_cmd: impl Into<String>,
        malicious_cmd: impl Into<String>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            legit_cmd: legit_cmd.into(),
            malicious_cmd: malicious_cmd.into(),
            runner,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.legit_ip_cmd.clone(), settings.malicious_ip_cmd.clone())
    }

    fn template(&self, verdict: &Verdict) -> &str {
        match verdict {
            Verdict::Malicious { .. } => &self.malicious_cmd,
            Verdict::Legit => &self.legit_cmd,
        }
    }

    /// Run the command for `verdict`. Never fails; problems are logged.
    pub async fn dispatch(&self, ip: &IpAddr, verdict: &Verdict) -> Dispatch {
        let template = self.template(verdict);
        if template.trim().is_empty() {
            debug!(ip = %ip, verdict = %verdict, "No command configured for verdict");
            return Dispatch::Skipped;
        }

        let argv = render(template, ip);
        match self.execute(&argv).await {
            Ok(()) => {
                info!(ip = %ip, verdict = %verdict, command = %argv.join(" "), "Executed command");
                Dispatch::Executed(argv)
            }
            Err(e) => {
                error!(ip = %ip, verdict = %verdict, error = %e, "Action failed");
                Dispatch::Failed
            }
        }
    }

    async fn execute(&self, argv: &[String]) -> Result<(), ActionError> {
        let status = self.runner.run(argv).await?;
        if !status.success() {
            return Err(ActionError::ExitStatus {
                command: argv.join(" "),
                status,
            });
        }
        Ok(())
    }
}

/// Substitute the address into a template and split it into arguments.
///
/// Templates are split on whitespace; there is no shell quoting.
pub fn render(template: &str, ip: &IpAddr) -> Vec<String> {
    template
        .replace(IP_PLACEHOLDER, &ip.to_string())
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Command runner that records instead of spawning.

    use super::*;
    use std::sync::{Arc, Mutex};

    fn status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[derive(Clone, Default)]
    pub struct RecordingRunner {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        exit_code: i32,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(exit_code: i32) -> Self {
            Self {
                exit_code,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, argv: &[String]) -> Result<ExitStatus, ActionError> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(status(self.exit_code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    fn ip() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn test_render_substitutes_address() {
        let argv = render("/sbin/pfctl -t bad -T add {ip}", &ip());
        assert_eq!(argv, vec!["/sbin/pfctl", "-t", "bad", "-T", "add", "203.0.113.7"]);
    }

    #[test]
    fn test_render_collapses_whitespace() {
        let argv = render("  ipset   add  bad {ip} ", &ip());
        assert_eq!(argv, vec!["ipset", "add", "bad", "203.0.113.7"]);
    }

    #[tokio::test]
    async fn test_dispatch_selects_template_by_verdict() {
        let runner = RecordingRunner::new();
        let dispatcher = ActionDispatcher::with_runner(
            "allow {ip}",
            "deny {ip}",
            Box::new(runner.clone()),
        );

        dispatcher.dispatch(&ip(), &Verdict::Legit).await;
        dispatcher.dispatch(&ip(), &Verdict::malicious("test")).await;

        assert_eq!(
            runner.calls(),
            vec![
                vec!["allow".to_string(), "203.0.113.7".to_string()],
                vec!["deny".to_string(), "203.0.113.7".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_empty_template_is_noop() {
        let runner = RecordingRunner::new();
        let dispatcher = ActionDispatcher::with_runner("", "deny {ip}", Box::new(runner.clone()));

        let outcome = dispatcher.dispatch(&ip(), &Verdict::Legit).await;
        assert_eq!(outcome, Dispatch::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_nonzero_exit_is_not_fatal() {
        let runner = RecordingRunner::failing(1);
        let dispatcher = ActionDispatcher::with_runner("", "deny {ip}", Box::new(runner.clone()));

        let outcome = dispatcher.dispatch(&ip(), &Verdict::malicious("test")).await;
        assert_eq!(outcome, Dispatch::Failed);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_process_runner_success_and_failure() {
        let runner = ProcessRunner;
        let ok = runner.run(&["true".to_string()]).await.unwrap();
        assert!(ok.success());

        let failed = runner.run(&["false".to_string()]).await.unwrap();
        assert!(!failed.success());
    }

    #[tokio::test]
    async fn test_process_runner_spawn_failure() {
        let err = ProcessRunner
            .run(&["/nonexistent/riversist-test-binary".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_process_runner_empty_command() {
        let err = ProcessRunner.run(&[]).await.unwrap_err();
        assert!(matches!(err, ActionError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_dispatch_runs_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("touch {}/{{ip}}", dir.path().display());
        let dispatcher = ActionDispatcher::new("", template);

        let outcome = dispatcher.dispatch(&ip(), &Verdict::malicious("test")).await;
        assert!(matches!(outcome, Dispatch::Executed(_)));
        assert!(dir.path().join("203.0.113.7").exists());
    }
}
