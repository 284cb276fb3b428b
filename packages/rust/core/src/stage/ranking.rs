//! Final ranking stage.

use std::sync::Arc;

use serde_json::json;
use tracing::instrument;

use stagegate_artifacts::{ArtifactStore, FINAL_RANKINGS};
use stagegate_shared::PipelineConfig;

use crate::merge::merge_and_rank;

use super::{error_response, read_artifact, render, today};

/// Driver for the ranking stage. Stateless apart from the store.
pub struct RankingStage {
    store: Arc<dyn ArtifactStore>,
    config: PipelineConfig,
}

impl RankingStage {
    pub fn new(store: Arc<dyn ArtifactStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Merge matches with validations into `final_rankings.json`.
    #[instrument(skip_all)]
    pub fn merge_and_rank(&self) -> String {
        match merge_and_rank(self.store.as_ref(), self.config.top_n, today()) {
            Ok(out) => render(&json!({
                "status": "success",
                "total_ranked": out.companies.len(),
                "validations_applied": out.metadata.total_companies_validated,
                "message": format!(
                    "Created {FINAL_RANKINGS} with top {} companies re-ranked by final scores",
                    out.companies.len()
                ),
            })),
            Err(e) => error_response(format!("Merge failed: {e}")),
        }
    }

    pub fn read_artifact(&self, path: &str, offset: usize, limit: usize) -> String {
        read_artifact(self.store.as_ref(), path, offset, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use stagegate_artifacts::{MATCHED_COMPANIES, MemoryArtifactStore, VALIDATED_RESULTS};

    #[test]
    fn ranks_with_and_without_validations() {
        let store = Arc::new(MemoryArtifactStore::new());
        let stage = RankingStage::new(store.clone(), PipelineConfig::default());

        let missing: Value = serde_json::from_str(&stage.merge_and_rank()).unwrap();
        assert!(missing["error"].as_str().unwrap().starts_with("Merge failed"));

        store
            .write(
                MATCHED_COMPANIES,
                r#"{"matches":[
                    {"ticker":"A","company_name":"A","score":0.7},
                    {"ticker":"B","company_name":"B","score":0.8}
                ]}"#,
            )
            .unwrap();
        store
            .write(
                VALIDATED_RESULTS,
                r#"{"total_validations":1,"validations":[{"ticker":"A","adjusted_score":0.9}]}"#,
            )
            .unwrap();

        let done: Value = serde_json::from_str(&stage.merge_and_rank()).unwrap();
        assert_eq!(done["total_ranked"], 2);
        assert_eq!(done["validations_applied"], 1);

        let top = stage.read_artifact(FINAL_RANKINGS, 0, 2_000);
        assert!(top.contains("\"ticker\": \"A\""));
        assert!(
            stage
                .read_artifact("nope.json", 0, 10)
                .starts_with("Error: file 'nope.json' not found")
        );
    }
}
