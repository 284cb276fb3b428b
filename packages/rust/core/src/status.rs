//! Pipeline status: what a run has produced so far, read purely from its
//! artifacts.

use serde::Serialize;

use stagegate_artifacts::{
    ArtifactStore, BatchLayout, FINAL_RANKINGS, MATCHED_COMPANIES, RecordLayout, THEMES_ANALYSIS,
    VALIDATED_RESULTS,
};
use stagegate_shared::Result;

use crate::cursor::next_batch_offset;

/// Furthest stage a run has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ThemeAnalysis,
    Matching,
    Validation,
    Ranking,
    Complete,
}

/// Snapshot of a run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub stage: Stage,
    pub themes_analysis: bool,
    pub batch_artifacts: usize,
    pub max_batch_offset: Option<u64>,
    /// Offset the next company query must use.
    pub next_batch_offset: u64,
    pub matched_companies: bool,
    pub validation_artifacts: usize,
    pub validated_results: bool,
    pub final_rankings: bool,
}

/// Inspect a run's artifacts.
pub fn run_status<S: ArtifactStore + ?Sized>(store: &S, batch_size: u64) -> Result<RunStatus> {
    let batches = BatchLayout::company_matches();
    let offsets: Vec<u64> = store
        .list(&batches.pattern())?
        .iter()
        .filter_map(|info| batches.parse_offset(&info.path))
        .collect();
    let max_batch_offset = offsets.iter().copied().max();
    let next_batch_offset = match max_batch_offset {
        Some(max) if batch_size > 0 => next_batch_offset(max, batch_size).unwrap_or(0),
        _ => 0,
    };

    let records = RecordLayout::validations();
    let validation_artifacts = store
        .list(&records.pattern())?
        .iter()
        .filter(|info| records.parse_identifier(&info.path).is_some())
        .count();

    let themes_analysis = store.exists(THEMES_ANALYSIS)?;
    let matched_companies = store.exists(MATCHED_COMPANIES)?;
    let validated_results = store.exists(VALIDATED_RESULTS)?;
    let final_rankings = store.exists(FINAL_RANKINGS)?;

    let stage = if final_rankings {
        Stage::Complete
    } else if validated_results {
        Stage::Ranking
    } else if matched_companies {
        Stage::Validation
    } else if themes_analysis || !offsets.is_empty() {
        Stage::Matching
    } else {
        Stage::ThemeAnalysis
    };

    Ok(RunStatus {
        stage,
        themes_analysis,
        batch_artifacts: offsets.len(),
        max_batch_offset,
        next_batch_offset,
        matched_companies,
        validation_artifacts,
        validated_results,
        final_rankings,
    })
}
