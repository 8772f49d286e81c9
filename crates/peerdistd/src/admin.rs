//! One-shot commands: a single cycle, prompt management, status.
//!
//! Results go to stdout as pretty JSON so they can be piped into other
//! tooling; logs stay on the tracing subscriber.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use peerdist_core::{PeerdistConfig, Prompt, PromptId, StudentId, SubmissionId};
use peerdist_orchestrator::{Distributor, FileRosterSource, epoch_secs};
use peerdist_state::{DistributionRecord, StateStore};

/// Open the configured store, creating its directory if needed.
pub fn open_store(config: &PeerdistConfig) -> anyhow::Result<StateStore> {
    if let Some(parent) = config.store.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(&config.store.path)?;
    info!(path = ?config.store.path, "state store opened");
    Ok(store)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_cycle(config: &PeerdistConfig, as_of: Option<u64>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let distributor = Distributor::new(
        Arc::new(FileRosterSource::new(&config.roster.dir)),
        Arc::new(store),
        config.distribution.reviews_per_student,
    );
    let report = distributor.run_cycle(as_of.unwrap_or_else(epoch_secs))?;
    print_json(&report)
}

pub fn add_prompt(config: &PeerdistConfig, prompt: Prompt) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.put_prompt(&prompt)?;
    info!(prompt_id = prompt.id, course_id = prompt.course_id, "prompt saved");
    print_json(&prompt)
}

pub fn list_prompts(config: &PeerdistConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&store.list_prompts()?)
}

pub fn status(config: &PeerdistConfig, prompt_id: PromptId) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&prompt_status(&store, prompt_id)?)
}

// ── Status view ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PromptStatusView {
    pub prompt: Prompt,
    pub distribution: Option<DistributionRecord>,
    /// Reviewer → submissions to review.
    pub reviews: BTreeMap<StudentId, Vec<SubmissionId>>,
}

pub fn prompt_status(store: &StateStore, prompt_id: PromptId) -> anyhow::Result<PromptStatusView> {
    let prompt = store
        .get_prompt(prompt_id)?
        .ok_or_else(|| anyhow::anyhow!("prompt {prompt_id} not found"))?;
    let distribution = store.get_distribution(prompt_id)?;

    let mut reviews: BTreeMap<StudentId, Vec<SubmissionId>> = BTreeMap::new();
    for review in store.list_reviews_for_prompt(prompt_id)? {
        reviews
            .entry(review.reviewer_id)
            .or_default()
            .push(review.submission_id);
    }

    Ok(PromptStatusView {
        prompt,
        distribution,
        reviews,
    })
}
