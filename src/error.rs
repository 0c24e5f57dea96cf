//! Error taxonomy shared by the API client, the aggregator and the run controller.

use crate::orchestrator::RunPhase;
use crate::model::RunCommand;
use thiserror::Error;

/// Failure talking to the routing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server could not be reached, or the connection broke mid-body.
    #[error("transport error reaching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered, but with a non-success status or a body we cannot decode.
    #[error("protocol error from {url}: {detail}")]
    Protocol { url: String, detail: String },
}

impl ApiError {
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn protocol(url: &str, detail: impl Into<String>) -> Self {
        ApiError::Protocol {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}

/// An average or ratio was requested over zero records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot aggregate over zero records")]
pub struct EmptyInputError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("a run is already {phase}; wait for it to finish before starting another")]
    ConcurrentRunRejected { phase: RunPhase },

    #[error("command `{0}` is not enabled in this dashboard")]
    CommandNotEnabled(RunCommand),

    #[error("no interrupted run to reconcile")]
    NothingToReconcile,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    ChosenModelMissing { chosen_model: String },
    EmptyModelScores,
    ValueOutOfRange { model: String, field: &'static str, value: f64 },
}

/// A structurally valid record whose contents contradict each other.
///
/// These are collected and shown as a banner; they never abort a computation.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[error("prompt {prompt_id}: {}", describe(.issue))]
pub struct DataIntegrityWarning {
    pub prompt_id: i64,
    pub issue: IntegrityIssue,
}

fn describe(issue: &IntegrityIssue) -> String {
    match issue {
        IntegrityIssue::ChosenModelMissing { chosen_model } => {
            format!("chosen model `{chosen_model}` has no score entry")
        }
        IntegrityIssue::EmptyModelScores => "result has no model scores".into(),
        IntegrityIssue::ValueOutOfRange {
            model,
            field,
            value,
        } => format!("{model} {field} {value} is out of range"),
    }
}

/// Failure of an operator action on the selected prompt or the weights.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("no prompt is selected")]
    NoPromptSelected,

    #[error(transparent)]
    Api(#[from] ApiError),
}
