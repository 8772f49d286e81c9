//! Engine error types.

use peerdist_core::{StudentId, SubmissionId};
use thiserror::Error;

/// A student who could not be given the required number of reviews.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Shortfall {
    pub student_id: StudentId,
    /// Eligible submissions found before candidates ran out.
    pub assigned: u32,
    pub required: u32,
}

/// Errors that can occur while computing a distribution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("reviews per student must be at least 1, got {0}")]
    InvalidReviewCount(u32),

    #[error("submission {submission_id} listed with authors {first_author} and {second_author}")]
    ConflictingSubmission {
        submission_id: SubmissionId,
        first_author: StudentId,
        second_author: StudentId,
    },

    #[error("not enough submissions to review for students {}", student_list(.shortfalls))]
    InsufficientCandidates { shortfalls: Vec<Shortfall> },
}

pub type EngineResult<T> = Result<T, EngineError>;

fn student_list(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| format!("{} ({}/{})", s.student_id, s.assigned, s.required))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_candidates_names_every_student() {
        let err = EngineError::InsufficientCandidates {
            shortfalls: vec![
                Shortfall { student_id: 1, assigned: 1, required: 3 },
                Shortfall { student_id: 2, assigned: 1, required: 3 },
            ],
        };
        assert_eq!(
            err.to_string(),
            "not enough submissions to review for students 1 (1/3), 2 (1/3)"
        );
    }
}
