//! Distributor: runs review distribution for every due prompt.
//!
//! One cycle:
//! - Lists prompts past their due date that are not yet distributed
//! - Refreshes each course roster once, in ascending course order
//! - Distributes each prompt in ascending id order and commits the plan
//! - Reports a per-prompt outcome; one prompt failing never stops another

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use peerdist_core::{CourseId, CourseRoster, Prompt};
use peerdist_engine::{distribute, distribute_by_section};

use crate::error::{CommitError, OrchestratorError, OrchestratorResult};
use crate::report::{CycleReport, FailureStage, PromptOutcome, PromptStatus, SkipReason};
use crate::source::{DistributionLedger, RosterSource};

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Drives distribution cycles against a roster source and a ledger.
pub struct Distributor {
    roster: Arc<dyn RosterSource>,
    ledger: Arc<dyn DistributionLedger>,
    /// Reviews per student for prompts that do not set their own count.
    default_reviews: u32,
}

impl Distributor {
    pub fn new(
        roster: Arc<dyn RosterSource>,
        ledger: Arc<dyn DistributionLedger>,
        default_reviews: u32,
    ) -> Self {
        Self {
            roster,
            ledger,
            default_reviews,
        }
    }

    /// Run one cycle to completion.
    pub fn run_cycle(&self, as_of: u64) -> OrchestratorResult<CycleReport> {
        let (_tx, rx) = watch::channel(false);
        self.run_cycle_until(as_of, &rx)
    }

    /// Run one cycle, stopping between prompts once `shutdown` reads true.
    ///
    /// Only listing the due prompts can fail the cycle as a whole. Every
    /// other failure is recorded against the prompt it belongs to.
    pub fn run_cycle_until(
        &self,
        as_of: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> OrchestratorResult<CycleReport> {
        let mut report = CycleReport::new(as_of);

        let mut prompts = self
            .ledger
            .due_prompts(as_of)
            .map_err(OrchestratorError::DuePrompts)?;
        if prompts.is_empty() {
            info!(as_of, "no prompts ready for review distribution");
            return Ok(report);
        }
        prompts.sort_by_key(|p| p.id);
        prompts.dedup_by_key(|p| p.id);
        info!(as_of, prompts = prompts.len(), "distributing peer reviews");

        let rosters = self.refresh_rosters(&prompts);

        for prompt in &prompts {
            if *shutdown.borrow() {
                warn!(
                    prompt_id = prompt.id,
                    "shutdown requested, leaving remaining prompts for the next cycle"
                );
                report.cancelled = true;
                break;
            }

            let status = match rosters.get(&prompt.course_id) {
                Some(Ok(roster)) => self.distribute_prompt(prompt, roster, as_of),
                Some(Err(reason)) => PromptStatus::failed(FailureStage::Roster, reason.clone()),
                None => PromptStatus::failed(FailureStage::Roster, "roster was not refreshed"),
            };

            match &status {
                PromptStatus::Distributed { students, reviews } => info!(
                    prompt_id = prompt.id,
                    course_id = prompt.course_id,
                    students,
                    reviews,
                    "peer reviews distributed"
                ),
                PromptStatus::Skipped { reason } => warn!(
                    prompt_id = prompt.id,
                    ?reason,
                    "prompt skipped"
                ),
                PromptStatus::Failed { stage, reason } => error!(
                    prompt_id = prompt.id,
                    course_id = prompt.course_id,
                    ?stage,
                    %reason,
                    "review distribution failed"
                ),
            }

            report.record(PromptOutcome {
                prompt_id: prompt.id,
                course_id: prompt.course_id,
                status,
            });
        }

        report.log_summary();
        Ok(report)
    }

    /// Fetch and record the roster of every course with a due prompt.
    fn refresh_rosters(
        &self,
        prompts: &[Prompt],
    ) -> BTreeMap<CourseId, Result<CourseRoster, String>> {
        let mut rosters = BTreeMap::new();
        for prompt in prompts {
            if !rosters.contains_key(&prompt.course_id) {
                rosters.insert(prompt.course_id, self.refresh_roster(prompt.course_id));
            }
        }
        rosters
    }

    fn refresh_roster(&self, course_id: CourseId) -> Result<CourseRoster, String> {
        let roster = self
            .roster
            .fetch_roster(course_id)
            .map_err(|e| format!("roster fetch failed: {e:#}"))?;
        self.ledger
            .record_roster(&roster)
            .map_err(|e| format!("roster snapshot failed: {e:#}"))?;
        debug!(course_id, students = roster.students.len(), "roster refreshed");
        Ok(roster)
    }

    fn distribute_prompt(
        &self,
        prompt: &Prompt,
        roster: &CourseRoster,
        as_of: u64,
    ) -> PromptStatus {
        let submissions = match self.roster.fetch_submissions(prompt) {
            Ok(submissions) => submissions,
            Err(e) => {
                return PromptStatus::failed(
                    FailureStage::Submissions,
                    format!("submission fetch failed: {e:#}"),
                );
            }
        };
        if let Err(e) = self
            .ledger
            .record_submissions(prompt.id, &submissions, epoch_secs())
        {
            return PromptStatus::failed(
                FailureStage::Submissions,
                format!("submission snapshot failed: {e:#}"),
            );
        }

        let n = prompt.review_count(self.default_reviews);
        debug!(
            prompt_id = prompt.id,
            students = roster.students.len(),
            submissions = submissions.len(),
            n,
            by_section = prompt.distribute_by_section,
            "running distribution"
        );
        let result = if prompt.distribute_by_section {
            distribute_by_section(&roster.students, &submissions, n)
        } else {
            distribute(&roster.students, &submissions, n)
        };
        let distribution = match result {
            Ok(distribution) => distribution,
            Err(e) => return PromptStatus::failed(FailureStage::Engine, e.to_string()),
        };

        match self.ledger.commit_distribution(
            prompt.id,
            &distribution.assignment,
            &distribution.load,
            as_of,
        ) {
            Ok(()) => PromptStatus::Distributed {
                students: distribution.assignment.len() as u32,
                reviews: distribution.total_assigned() as u32,
            },
            Err(CommitError::Conflict) => PromptStatus::Skipped {
                reason: SkipReason::AlreadyDistributed,
            },
            Err(e) => PromptStatus::failed(FailureStage::Persist, e.to_string()),
        }
    }

    /// Run cycles every `interval` until `shutdown` changes.
    ///
    /// Cycles run on the blocking pool since the ledger and roster source
    /// do synchronous I/O. A cycle that fails as a whole is logged and the
    /// loop carries on.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            "distributor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let this = Arc::clone(&self);
                    let stop = shutdown.clone();
                    let cycle = tokio::task::spawn_blocking(move || {
                        this.run_cycle_until(epoch_secs(), &stop)
                    })
                    .await
                    .map_err(|e| OrchestratorError::Task(e.to_string()))
                    .and_then(|r| r);
                    if let Err(e) = cycle {
                        error!(error = %e, "distribution cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("distributor shutting down");
                    break;
                }
            }
        }
    }
}
