//! Orchestrator error types.

use thiserror::Error;

/// Errors that abort a whole distribution cycle.
///
/// Anything scoped to a single prompt is recorded in the cycle report
/// instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to list due prompts: {0:#}")]
    DuePrompts(anyhow::Error),

    #[error("distribution task failed: {0}")]
    Task(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Outcome of a failed attempt to commit a distribution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    /// The prompt was committed by someone else first.
    #[error("distribution already committed")]
    Conflict,

    #[error("commit failed: {0}")]
    Failed(String),
}

impl From<peerdist_state::StateError> for CommitError {
    fn from(e: peerdist_state::StateError) -> Self {
        match e {
            peerdist_state::StateError::AlreadyDistributed(_) => CommitError::Conflict,
            other => CommitError::Failed(other.to_string()),
        }
    }
}
