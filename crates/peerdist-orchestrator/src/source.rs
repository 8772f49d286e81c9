//! Collaborators the distributor talks to.
//!
//! `RosterSource` is the read side (who is enrolled, what was submitted).
//! `DistributionLedger` is the durable side (which prompts are due, what
//! was fetched, and the atomic commit of a plan). Both are object safe so
//! the distributor can hold them behind `Arc<dyn _>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use tracing::debug;

use peerdist_core::{
    CourseId, CourseRoster, Prompt, PromptId, ReviewAssignment, ReviewLoad, Submission,
};
use peerdist_state::{StateStore, SubmissionSet};

use crate::distributor::epoch_secs;
use crate::error::CommitError;

/// Source of course rosters and prompt submissions.
pub trait RosterSource: Send + Sync {
    /// Current sections and students of a course.
    fn fetch_roster(&self, course_id: CourseId) -> anyhow::Result<CourseRoster>;

    /// Every submission made for a prompt.
    fn fetch_submissions(&self, prompt: &Prompt) -> anyhow::Result<Vec<Submission>>;
}

/// Durable record of prompts and their distributions.
pub trait DistributionLedger: Send + Sync {
    /// Prompts past their due date whose distribution is not complete.
    fn due_prompts(&self, as_of: u64) -> anyhow::Result<Vec<Prompt>>;

    /// Keep the roster snapshot a distribution was computed from.
    fn record_roster(&self, roster: &CourseRoster) -> anyhow::Result<()>;

    /// Keep the submission snapshot a distribution was computed from.
    fn record_submissions(
        &self,
        prompt_id: PromptId,
        submissions: &[Submission],
        refreshed_at: u64,
    ) -> anyhow::Result<()>;

    /// Write the review rows and mark the prompt complete, all or nothing.
    fn commit_distribution(
        &self,
        prompt_id: PromptId,
        assignment: &ReviewAssignment,
        load: &ReviewLoad,
        completed_at: u64,
    ) -> Result<(), CommitError>;
}

impl DistributionLedger for StateStore {
    fn due_prompts(&self, as_of: u64) -> anyhow::Result<Vec<Prompt>> {
        Ok(self.list_due_prompts(as_of)?)
    }

    fn record_roster(&self, roster: &CourseRoster) -> anyhow::Result<()> {
        Ok(self.put_roster(roster)?)
    }

    fn record_submissions(
        &self,
        prompt_id: PromptId,
        submissions: &[Submission],
        refreshed_at: u64,
    ) -> anyhow::Result<()> {
        let set = SubmissionSet {
            prompt_id,
            submissions: submissions.to_vec(),
            refreshed_at,
        };
        Ok(self.put_submissions(&set)?)
    }

    fn commit_distribution(
        &self,
        prompt_id: PromptId,
        assignment: &ReviewAssignment,
        load: &ReviewLoad,
        completed_at: u64,
    ) -> Result<(), CommitError> {
        StateStore::commit_distribution(self, prompt_id, assignment, load, completed_at)?;
        Ok(())
    }
}

// ── File roster source ─────────────────────────────────────────────

/// Reads LMS export snapshots from a directory.
///
/// ```text
/// {dir}/courses/{course_id}.json                 CourseRoster
/// {dir}/prompts/{prompt_id}/submissions.json     [Submission]
/// ```
#[derive(Debug, Clone)]
pub struct FileRosterSource {
    dir: PathBuf,
}

impl FileRosterSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn roster_path(&self, course_id: CourseId) -> PathBuf {
        self.dir.join("courses").join(format!("{course_id}.json"))
    }

    fn submissions_path(&self, prompt_id: PromptId) -> PathBuf {
        self.dir
            .join("prompts")
            .join(prompt_id.to_string())
            .join("submissions.json")
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

impl RosterSource for FileRosterSource {
    fn fetch_roster(&self, course_id: CourseId) -> anyhow::Result<CourseRoster> {
        let path = self.roster_path(course_id);
        let mut roster: CourseRoster = read_json(&path)?;
        if roster.course_id != course_id {
            bail!(
                "{} holds course {}, expected {course_id}",
                path.display(),
                roster.course_id
            );
        }
        if roster.refreshed_at == 0 {
            roster.refreshed_at = epoch_secs();
        }
        debug!(course_id, students = roster.students.len(), "roster loaded");
        Ok(roster)
    }

    fn fetch_submissions(&self, prompt: &Prompt) -> anyhow::Result<Vec<Submission>> {
        let submissions: Vec<Submission> = read_json(&self.submissions_path(prompt.id))?;
        debug!(
            prompt_id = prompt.id,
            submissions = submissions.len(),
            "submissions loaded"
        );
        Ok(submissions)
    }
}
