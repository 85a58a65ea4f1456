//! Testable execution of external programs.
//!
//! The local speech engine shells out to `espeak-ng`; going through
//! [`CommandExecutor`] keeps it testable without audio hardware.

use crate::error::{PipelineError, Result};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and return its stdout.
    ///
    /// A missing binary maps to `ToolNotFound`, a non-zero exit to
    /// `CommandFailed`.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                PipelineError::CommandFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::CommandFailed {
                command: command.to_string(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Mock command executor for testing.
///
/// Records all command executions and returns queued responses, or an
/// empty success once the queue is drained.
#[derive(Debug, Default)]
pub struct MockCommandExecutor {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, response: &str) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.to_string()));
        }
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: PipelineError) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
        self
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                command.to_string(),
                args.iter().map(|s| s.to_string()).collect(),
            ));
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Ok(String::new()))
    }
}
