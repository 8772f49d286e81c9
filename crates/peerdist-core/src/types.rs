//! Shared types used across peerdist crates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// LMS identifier of a student.
pub type StudentId = u64;

/// LMS identifier of a submission.
pub type SubmissionId = u64;

/// LMS identifier of a course.
pub type CourseId = u64;

/// LMS identifier of a prompt (the assignment whose submissions get reviewed).
pub type PromptId = u64;

/// LMS identifier of a course section.
pub type SectionId = u64;

/// Reviewer → submissions that reviewer must review.
pub type ReviewAssignment = BTreeMap<StudentId, BTreeSet<SubmissionId>>;

/// Submission → number of reviewers assigned to it.
pub type ReviewLoad = BTreeMap<SubmissionId, u32>;

/// Number of reviews each student gives when a prompt does not say otherwise.
pub const DEFAULT_REVIEWS_PER_STUDENT: u32 = 3;

/// A student enrolled in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// Sections the student is enrolled in. Only used for section-scoped
    /// distribution.
    #[serde(default)]
    pub sections: BTreeSet<SectionId>,
}

impl Student {
    pub fn new(id: StudentId) -> Self {
        Self {
            id,
            sections: BTreeSet::new(),
        }
    }

    pub fn in_sections(id: StudentId, sections: impl IntoIterator<Item = SectionId>) -> Self {
        Self {
            id,
            sections: sections.into_iter().collect(),
        }
    }

    /// The section that decides which review group the student lands in.
    pub fn primary_section(&self) -> Option<SectionId> {
        self.sections.first().copied()
    }
}

/// A piece of work handed in for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub author_id: StudentId,
}

impl Submission {
    pub fn new(id: SubmissionId, author_id: StudentId) -> Self {
        Self { id, author_id }
    }
}

/// A named course section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
}

/// Sections and students of a course as of one roster fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRoster {
    pub course_id: CourseId,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub students: Vec<Student>,
    /// Unix timestamp (seconds) of the fetch. Zero when unknown.
    #[serde(default)]
    pub refreshed_at: u64,
}

impl CourseRoster {
    /// Build the key for the rosters table.
    pub fn table_key(&self) -> String {
        self.course_id.to_string()
    }
}

/// An assignment whose submissions are peer reviewed once it is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub course_id: CourseId,
    #[serde(default)]
    pub title: String,
    /// Unix timestamp (seconds). A prompt without a due date is never due.
    pub due_date: Option<u64>,
    /// Reviews each student gives. Falls back to the configured default.
    #[serde(default)]
    pub reviews_per_student: Option<u32>,
    /// Only distribute reviews between students of the same section.
    #[serde(default)]
    pub distribute_by_section: bool,
}

impl Prompt {
    /// Build the key for the prompts table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }

    /// Whether the prompt's due date lies strictly before `as_of`.
    pub fn is_due(&self, as_of: u64) -> bool {
        self.due_date.is_some_and(|due| due < as_of)
    }

    /// Reviews per student for this prompt, given the configured default.
    pub fn review_count(&self, default: u32) -> u32 {
        self.reviews_per_student.unwrap_or(default)
    }
}
