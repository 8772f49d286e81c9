//! Persisted record types for the peerdist state store.
//!
//! Prompts and roster snapshots reuse the `peerdist-core` types directly;
//! the records here only exist once a prompt has been refreshed or
//! distributed.

use serde::{Deserialize, Serialize};

pub use peerdist_core::{
    CourseId, CourseRoster, Prompt, PromptId, ReviewLoad, StudentId, Submission, SubmissionId,
};

// ── Submissions ────────────────────────────────────────────────────

/// Submissions of one prompt as of the last refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionSet {
    pub prompt_id: PromptId,
    pub submissions: Vec<Submission>,
    /// Unix timestamp of the refresh.
    pub refreshed_at: u64,
}

impl SubmissionSet {
    /// Build the key for the submissions table.
    pub fn table_key(&self) -> String {
        self.prompt_id.to_string()
    }
}

// ── Distribution ───────────────────────────────────────────────────

/// Completion marker and summary of a prompt's distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionRecord {
    pub prompt_id: PromptId,
    pub is_complete: bool,
    /// Unix timestamp at which the plan was committed.
    pub distributed_at: u64,
    /// Number of students given reviews.
    pub students: u32,
    /// Number of (reviewer, submission) rows written.
    pub total_reviews: u32,
    /// Submission → number of reviewers.
    pub review_load: ReviewLoad,
}

impl DistributionRecord {
    /// Build the key for the distributions table.
    pub fn table_key(&self) -> String {
        self.prompt_id.to_string()
    }
}

// ── Reviews ────────────────────────────────────────────────────────

/// One student assigned to review one submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerReview {
    pub prompt_id: PromptId,
    pub reviewer_id: StudentId,
    pub submission_id: SubmissionId,
    /// Unix timestamp of the distribution that created the row.
    pub assigned_at: u64,
}

impl PeerReview {
    /// Build the composite key for the reviews table.
    pub fn table_key(&self) -> String {
        format!("{}:{}:{}", self.prompt_id, self.reviewer_id, self.submission_id)
    }
}
