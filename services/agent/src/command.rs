//! External command execution.
//!
//! Every host mutation (switch attachments, link deletion, networkd reloads)
//! goes through a [`CommandRunner`], so the rest of the agent can be exercised
//! against [`MockRunner`] without touching the host.

use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

/// Default upper bound on a single command invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from running external commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error(
        "{program} exited with {}: {}",
        .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")),
        .stderr.trim()
    )]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl CommandError {
    /// Standard error captured from the failed process, if it ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` and return its raw stdout.
    ///
    /// Used directly when the output is a single structured blob.
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;

    /// Run `program` and return its non-empty stdout lines.
    async fn run_lines(&self, program: &str, args: &[&str]) -> Result<Vec<String>, CommandError> {
        let stdout = self.run(program, args).await?;
        Ok(split_lines(&stdout))
    }
}

/// Split command output into its non-empty lines.
pub fn split_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs commands on the host with a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct HostRunner {
    timeout: Duration,
}

impl HostRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HostRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        debug!(command = %program, args = ?args, "Running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the output future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                let err = CommandError::Spawn {
                    program: program.to_string(),
                    source,
                };
                error!(command = %program, args = ?args, error = %err, "Command failed");
                return Err(err);
            }
            Err(_) => {
                let err = CommandError::TimedOut {
                    program: program.to_string(),
                    timeout: self.timeout,
                };
                error!(command = %program, args = ?args, error = %err, "Command failed");
                return Err(err);
            }
        };

        if !output.status.success() {
            let err = CommandError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            error!(command = %program, args = ?args, error = %err, "Command failed");
            return Err(err);
        }

        debug!(command = %program, args = ?args, "Command succeeded");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Canned reply for [`MockRunner`].
#[derive(Debug, Clone)]
enum MockReply {
    Stdout(String),
    Stderr(String),
}

#[derive(Debug, Clone)]
struct MockRule {
    program: String,
    token: String,
    reply: MockReply,
}

/// Scripted command runner for tests and dry runs.
///
/// Replies are matched on program name plus one argument token; the most
/// recently registered matching rule wins. Unmatched commands succeed with
/// empty output. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct MockRunner {
    rules: Mutex<Vec<MockRule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `stdout` when `program` runs with `token` among its args.
    pub fn reply(&self, program: &str, token: &str, stdout: &str) -> &Self {
        self.push_rule(program, token, MockReply::Stdout(stdout.to_string()))
    }

    /// Exit non-zero with `stderr` when `program` runs with `token` among its args.
    pub fn fail(&self, program: &str, token: &str, stderr: &str) -> &Self {
        self.push_rule(program, token, MockReply::Stderr(stderr.to_string()))
    }

    /// Every invocation so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Invocations of `program` whose arguments include `token`.
    pub fn calls_with(&self, program: &str, token: &str) -> Vec<Vec<String>> {
        lock(&self.calls)
            .iter()
            .filter(|call| call[0] == program && call[1..].iter().any(|arg| arg == token))
            .cloned()
            .collect()
    }

    fn push_rule(&self, program: &str, token: &str, reply: MockReply) -> &Self {
        lock(&self.rules).push(MockRule {
            program: program.to_string(),
            token: token.to_string(),
            reply,
        });
        self
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|arg| arg.to_string()));
        lock(&self.calls).push(call);

        let reply = lock(&self.rules)
            .iter()
            .rev()
            .find(|rule| rule.program == program && args.contains(&rule.token.as_str()))
            .map(|rule| rule.reply.clone());

        match reply {
            Some(MockReply::Stdout(stdout)) => Ok(stdout),
            Some(MockReply::Stderr(stderr)) => Err(CommandError::Failed {
                program: program.to_string(),
                code: Some(1),
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
