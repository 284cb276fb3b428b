//! Company matching stage: sequential company batches, then consolidation.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};

use stagegate_artifacts::{ArtifactStore, BatchLayout, MATCHED_COMPANIES};
use stagegate_shared::{CompanyBatchResponse, PipelineConfig, Result};

use crate::consolidate::{Consolidation, consolidate_matches};
use crate::cursor::BatchCursor;
use crate::sources::CompanySource;

use super::{error_response, read_artifact, render, today};

/// Driver for the matching stage.
pub struct MatchingStage {
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn CompanySource>,
    cursor: BatchCursor,
    config: PipelineConfig,
}

impl MatchingStage {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        source: Arc<dyn CompanySource>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let cursor = BatchCursor::new(BatchLayout::company_matches(), config.batch_size)?;
        Ok(Self {
            store,
            source,
            cursor,
            config,
        })
    }

    pub fn cursor(&self) -> &BatchCursor {
        &self.cursor
    }

    /// Gated company batch query. `limit` must equal the batch size.
    #[instrument(skip_all, fields(offset = offset, limit = limit))]
    pub async fn query_companies_response(&mut self, offset: u64, limit: u64) -> CompanyBatchResponse {
        let gated = self
            .cursor
            .check_page_size(limit)
            .and_then(|()| self.cursor.validate_and_advance(self.store.as_ref(), offset));
        if let Err(rejection) = gated {
            return CompanyBatchResponse::rejected(rejection.to_string(), offset, limit);
        }

        let page = match self.source.fetch_companies(offset, limit).await {
            Ok(page) => page,
            Err(e) => {
                error!(offset, error = %e, "company query failed");
                self.cursor.release(offset);
                return CompanyBatchResponse::rejected(
                    format!("company query failed: {e}"),
                    offset,
                    limit,
                );
            }
        };

        let has_more = offset.saturating_add(page.rows_returned as u64) < page.total_count;
        if !has_more {
            self.cursor.mark_complete();
        }

        let dropped = page.rows_returned.saturating_sub(page.companies.len());
        if dropped > 0 {
            warn!(offset, dropped, "dropped company rows missing required fields");
        }
        info!(
            offset,
            returned = page.companies.len(),
            total = page.total_count,
            has_more,
            "company batch served"
        );

        CompanyBatchResponse {
            error: None,
            returned: page.companies.len(),
            companies: page.companies,
            total_count: page.total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// [`Self::query_companies_response`] rendered as JSON.
    pub async fn query_companies(&mut self, offset: u64, limit: u64) -> String {
        render(&self.query_companies_response(offset, limit).await)
    }

    /// Fold every batch artifact into `matched_companies.json`.
    #[instrument(skip_all)]
    pub fn consolidate(&self) -> String {
        let layout = self.cursor.layout();
        match consolidate_matches(self.store.as_ref(), layout, self.config.top_n, today()) {
            Ok(Consolidation::Written(out)) => {
                let total = out.metadata.total_companies_analyzed;
                let batches = out.metadata.total_batches_processed;
                render(&json!({
                    "status": "success",
                    "total_matches_found": total,
                    "top_companies_selected": out.matches.len(),
                    "batches_processed": batches,
                    "skipped_artifacts": out.metadata.skipped_artifacts,
                    "message": format!(
                        "Consolidated {total} matches from {batches} batches into {MATCHED_COMPANIES}"
                    ),
                }))
            }
            Ok(Consolidation::NothingToDo { pattern }) => {
                error_response(format!("No batch files found matching {pattern}"))
            }
            Err(e) => error_response(format!("Consolidation failed: {e}")),
        }
    }

    pub fn read_artifact(&self, path: &str, offset: usize, limit: usize) -> String {
        read_artifact(self.store.as_ref(), path, offset, limit)
    }
}
