//! Press-release validation stage: one company at a time, in match order,
//! each artifact written before the next query.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use stagegate_artifacts::{ArtifactStore, MATCHED_COMPANIES, RecordLayout, VALIDATED_RESULTS};
use stagegate_shared::{PipelineConfig, PressReleaseBatchResponse, Result, StageGateError};

use crate::consolidate::{Consolidation, consolidate_validations};
use crate::gate::RecordGate;
use crate::sources::PressReleaseSource;

use super::{error_response, read_artifact, render, today};

#[derive(Deserialize)]
struct TickerEntry {
    ticker: String,
}

/// Just the tickers of the matches aggregate, in rank order.
#[derive(Deserialize)]
struct MatchedTickers {
    #[serde(default)]
    matches: Option<Vec<TickerEntry>>,
    #[serde(default)]
    top_100_matches: Option<Vec<TickerEntry>>,
}

/// Tickers listed in a matches aggregate, falling back to the legacy
/// `top_100_matches` key when `matches` is missing or empty.
pub fn extract_tickers(content: &str) -> Result<Vec<String>> {
    let parsed: MatchedTickers = serde_json::from_str(content)
        .map_err(|e| StageGateError::parse(format!("{MATCHED_COMPANIES}: {e}")))?;
    let entries = match parsed.matches {
        Some(list) if !list.is_empty() => list,
        _ => parsed.top_100_matches.unwrap_or_default(),
    };
    Ok(entries.into_iter().map(|e| e.ticker).collect())
}

/// Driver for the validation stage.
pub struct ValidationStage {
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn PressReleaseSource>,
    gate: RecordGate,
    config: PipelineConfig,
}

impl ValidationStage {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        source: Arc<dyn PressReleaseSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            source,
            gate: RecordGate::new(RecordLayout::validations()),
            config,
        }
    }

    pub fn gate(&self) -> &RecordGate {
        &self.gate
    }

    /// Load the worklist from `matched_companies.json` and reconcile it
    /// against the validations already written.
    #[instrument(skip_all)]
    pub fn init_queue(&mut self) -> String {
        let tickers = match self
            .store
            .read(MATCHED_COMPANIES)
            .and_then(|content| extract_tickers(&content))
        {
            Ok(tickers) => tickers,
            Err(e) => return error_response(format!("Failed to extract tickers: {e}")),
        };

        let status = match self.gate.initialize(self.store.as_ref(), tickers) {
            Some(outcome) if outcome.is_degraded() => "initialized_degraded",
            Some(_) => "initialized",
            None => "already_initialized",
        };

        let total = self.gate.worklist().len();
        let remaining = self.gate.remaining();
        render(&json!({
            "status": status,
            "total_companies": total,
            "companies": self.gate.worklist(),
            "completed": self.gate.cursor_index(),
            "remaining": remaining,
            "next": self.gate.worklist().get(self.gate.cursor_index()),
            "message": format!(
                "Validation queue holds {total} companies, {remaining} remaining. Process them IN ORDER."
            ),
        }))
    }

    /// Gated press-release query for exactly one symbol.
    #[instrument(skip_all, fields(symbols = symbols, skip = skip, limit = limit))]
    pub async fn query_press_releases_response(
        &mut self,
        symbols: &str,
        skip: u64,
        limit: u64,
    ) -> PressReleaseBatchResponse {
        let admission = match self
            .gate
            .validate_and_advance(self.store.as_ref(), symbols, skip)
        {
            Ok(admission) => admission,
            Err(rejection) => {
                return PressReleaseBatchResponse::rejected(rejection.to_string(), skip, limit);
            }
        };

        let limit = limit.min(self.config.press_release_limit_cap);
        let symbol = admission.identifier.as_str();
        let page = match self.source.fetch_press_releases(symbol, skip, limit).await {
            Ok(page) => page,
            Err(e) => {
                error!(symbol, error = %e, "press release query failed");
                self.gate.release(symbol);
                return PressReleaseBatchResponse::rejected(
                    format!("press release query failed: {e}"),
                    skip,
                    limit,
                );
            }
        };

        let has_more = skip + (page.rows_returned as u64) < page.total_count;
        if has_more {
            warn!(
                symbol,
                returned = page.rows_returned,
                total = page.total_count,
                limit,
                "press releases truncated to one page; remaining documents are not fetched"
            );
        }
        info!(
            symbol,
            position = admission.position,
            total = admission.total,
            returned = page.press_releases.len(),
            artifact = %admission.artifact_path,
            "press releases served"
        );

        PressReleaseBatchResponse {
            error: None,
            returned: page.press_releases.len(),
            press_releases: page.press_releases,
            total_count: page.total_count,
            skip,
            limit,
            has_more,
        }
    }

    /// [`Self::query_press_releases_response`] rendered as JSON.
    pub async fn query_press_releases(&mut self, symbols: &str, skip: u64, limit: u64) -> String {
        render(&self.query_press_releases_response(symbols, skip, limit).await)
    }

    /// Write an artifact and let the gate observe it.
    #[instrument(skip_all, fields(path = path))]
    pub fn write_artifact(&mut self, path: &str, content: &str) -> String {
        if let Err(e) = self.store.write(path, content) {
            return error_response(format!("Failed to write {path}: {e}"));
        }
        let advanced = self.gate.observe_write(path);
        info!(bytes = content.len(), advanced, "artifact written");
        render(&json!({
            "status": "written",
            "path": path,
            "advanced": advanced,
        }))
    }

    /// String replacement inside an artifact; the rewrite is observed by
    /// the gate exactly like a fresh write.
    #[instrument(skip_all, fields(path = path, replace_all = replace_all))]
    pub fn edit_artifact(&mut self, path: &str, old: &str, new: &str, replace_all: bool) -> String {
        let occurrences = match self.store.edit(path, old, new, replace_all) {
            Ok(n) => n,
            Err(e) => return error_response(format!("Failed to edit {path}: {e}")),
        };
        let advanced = self.gate.observe_write(path);
        info!(occurrences, advanced, "artifact edited");
        render(&json!({
            "status": "edited",
            "path": path,
            "occurrences": occurrences,
            "advanced": advanced,
        }))
    }

    /// Fold every per-company validation into `validated_results.json`.
    #[instrument(skip_all)]
    pub fn consolidate(&self) -> String {
        match consolidate_validations(self.store.as_ref(), self.gate.layout(), today()) {
            Ok(Consolidation::Written(out)) => {
                let total = out.total_validations;
                let files = out.metadata.files_processed;
                render(&json!({
                    "status": "success",
                    "total_validations": total,
                    "files_processed": files,
                    "skipped_artifacts": out.metadata.skipped_artifacts,
                    "message": format!(
                        "Consolidated {total} validations from {files} files into {VALIDATED_RESULTS}"
                    ),
                }))
            }
            Ok(Consolidation::NothingToDo { pattern }) => {
                error_response(format!("No validation files found matching {pattern}"))
            }
            Err(e) => error_response(format!("Consolidation failed: {e}")),
        }
    }

    pub fn read_artifact(&self, path: &str, offset: usize, limit: usize) -> String {
        read_artifact(self.store.as_ref(), path, offset, limit)
    }
}
