//! Run state and the fold that applies stream events to it.

use crate::model::{RunCommand, RunEvent, RunOutcome};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Starting,
    Streaming,
    Completed,
    Failed,
    ConnectionLost,
}

impl RunPhase {
    /// A run request is in flight or its stream is open.
    pub fn is_active(self) -> bool {
        matches!(self, RunPhase::Starting | RunPhase::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Failed | RunPhase::ConnectionLost
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Idle => "idle",
            RunPhase::Starting => "starting",
            RunPhase::Streaming => "streaming",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::ConnectionLost => "connection lost",
        })
    }
}

/// Everything known about the current (or most recent) run.
///
/// The output log is append-only until the next run starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    phase: RunPhase,
    command: Option<RunCommand>,
    run_id: Option<String>,
    return_code: Option<i32>,
    output: Vec<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            command: None,
            run_id: None,
            return_code: None,
            output: Vec::new(),
        }
    }
}

impl RunState {
    pub(super) fn starting(command: RunCommand) -> Self {
        Self {
            phase: RunPhase::Starting,
            command: Some(command),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn command(&self) -> Option<RunCommand> {
        self.command
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn return_code(&self) -> Option<i32> {
        self.return_code
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub(super) fn push(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    pub(super) fn streaming(&mut self, run_id: String) {
        self.run_id = Some(run_id);
        self.phase = RunPhase::Streaming;
    }

    pub(super) fn fail(&mut self, message: impl fmt::Display) {
        self.push(format!("Error: {message}"));
        self.phase = RunPhase::Failed;
    }

    pub(super) fn lose_connection(&mut self, reason: impl fmt::Display) {
        self.push(format!("Connection lost: {reason}"));
        self.phase = RunPhase::ConnectionLost;
    }

    /// Record a final status, from the stream or from a status query.
    pub(super) fn finish(&mut self, outcome: RunOutcome, return_code: Option<i32>) {
        self.return_code = return_code;
        self.push(completion_line(outcome, return_code));
        self.phase = match outcome {
            RunOutcome::Completed => RunPhase::Completed,
            RunOutcome::Failed => RunPhase::Failed,
        };
    }

    /// Apply one stream event; events after a terminal transition are dropped.
    pub(super) fn apply(&mut self, event: RunEvent) {
        if self.phase != RunPhase::Streaming {
            debug!(phase = %self.phase, ?event, "ignoring event outside streaming phase");
            return;
        }
        match event {
            RunEvent::Output { data } => self.push(data),
            RunEvent::Status {
                status,
                return_code,
            } => self.finish(status, return_code),
            RunEvent::Error { message } => self.fail(message),
        }
    }
}

fn completion_line(outcome: RunOutcome, return_code: Option<i32>) -> String {
    let status = match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Failed => "failed",
    };
    match return_code {
        Some(code) => format!("Process {status} with code: {code}"),
        None => format!("Process {status}"),
    }
}
