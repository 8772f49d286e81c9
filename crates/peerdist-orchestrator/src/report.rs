//! Per-prompt outcomes and the cycle report that collects them.

use serde::Serialize;
use tracing::info;

use peerdist_core::{CourseId, PromptId};

/// Where a prompt's distribution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The course roster could not be fetched or recorded.
    Roster,
    /// The prompt's submissions could not be fetched or recorded.
    Submissions,
    /// The engine rejected the input (e.g. too few submissions).
    Engine,
    /// The plan could not be committed.
    Persist,
}

/// Why a prompt was left alone without counting as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another cycle committed this prompt first.
    AlreadyDistributed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromptStatus {
    Distributed { students: u32, reviews: u32 },
    Skipped { reason: SkipReason },
    Failed { stage: FailureStage, reason: String },
}

impl PromptStatus {
    pub(crate) fn failed(stage: FailureStage, reason: impl Into<String>) -> Self {
        PromptStatus::Failed {
            stage,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptOutcome {
    pub prompt_id: PromptId,
    pub course_id: CourseId,
    #[serde(flatten)]
    pub status: PromptStatus,
}

/// Everything that happened during one distribution cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub as_of: u64,
    pub outcomes: Vec<PromptOutcome>,
    /// Shutdown was requested before every due prompt was handled.
    pub cancelled: bool,
}

impl CycleReport {
    pub fn new(as_of: u64) -> Self {
        Self {
            as_of,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, outcome: PromptOutcome) {
        self.outcomes.push(outcome);
    }

    /// No prompt was due.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty() && !self.cancelled
    }

    pub fn distributed(&self) -> usize {
        self.count(|s| matches!(s, PromptStatus::Distributed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PromptStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PromptStatus::Failed { .. }))
    }

    pub fn outcome(&self, prompt_id: PromptId) -> Option<&PromptOutcome> {
        self.outcomes.iter().find(|o| o.prompt_id == prompt_id)
    }

    fn count(&self, pred: impl Fn(&PromptStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub(crate) fn log_summary(&self) {
        info!(
            as_of = self.as_of,
            distributed = self.distributed(),
            skipped = self.skipped(),
            failed = self.failed(),
            cancelled = self.cancelled,
            "review distribution finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(prompt_id: PromptId, status: PromptStatus) -> PromptOutcome {
        PromptOutcome {
            prompt_id,
            course_id: 1,
            status,
        }
    }

    #[test]
    fn counts_by_status() {
        let mut report = CycleReport::new(100);
        assert!(report.is_noop());

        report.record(outcome(1, PromptStatus::Distributed { students: 5, reviews: 15 }));
        report.record(outcome(2, PromptStatus::failed(FailureStage::Engine, "too few")));
        report.record(outcome(
            3,
            PromptStatus::Skipped {
                reason: SkipReason::AlreadyDistributed,
            },
        ));

        assert!(!report.is_noop());
        assert_eq!(report.distributed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.outcome(2).map(|o| o.course_id), Some(1));
        assert!(report.outcome(4).is_none());
    }

    #[test]
    fn serializes_flat_status() {
        let json = serde_json::to_value(outcome(
            9,
            PromptStatus::failed(FailureStage::Persist, "disk full"),
        ))
        .unwrap();
        assert_eq!(json["prompt_id"], 9);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "persist");
        assert_eq!(json["reason"], "disk full");
    }
}
