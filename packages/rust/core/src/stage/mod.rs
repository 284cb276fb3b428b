//! Stage drivers: the tool surface a driving agent calls.
//!
//! Each driver owns its state machine and shares the run's artifact store.
//! Every operation answers with a JSON document; failures and rejections
//! come back as an `error` field, never as an `Err`, because the caller
//! reads the text and decides what to do next.

mod matching;
mod ranking;
mod validation;

pub use matching::MatchingStage;
pub use ranking::RankingStage;
pub use validation::ValidationStage;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;

use stagegate_artifacts::ArtifactStore;

/// Pretty-print a tool response.
pub(crate) fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| json!({ "error": format!("failed to encode response: {e}") }).to_string())
}

/// `{"error": message}`.
pub(crate) fn error_response(message: impl Into<String>) -> String {
    render(&json!({ "error": message.into() }))
}

/// Dates stamped on aggregates use the local calendar day.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Numbered-line read of an artifact (`{n:6}|{line}`).
pub fn read_artifact(
    store: &dyn ArtifactStore,
    path: &str,
    offset: usize,
    limit: usize,
) -> String {
    match store.read_range(path, offset, limit) {
        Ok(text) => text,
        Err(e) if e.is_not_found() => format!("Error: file '{path}' not found"),
        Err(e) => format!("Error: {e}"),
    }
}

/// One level of a run directory as JSON entries.
pub fn list_directory(store: &dyn ArtifactStore, dir: &str) -> String {
    match store.ls(dir) {
        Ok(entries) => render(&entries),
        Err(e) => error_response(format!("Failed to list {dir}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use stagegate_artifacts::{BatchLayout, FINAL_RANKINGS, MemoryArtifactStore};
    use stagegate_shared::{
        Company, CompanyPage, FinalOutput, PipelineConfig, PressRelease, PressReleasePage, Result,
    };

    use super::*;
    use crate::sources::{CompanySource, PressReleaseSource};

    const TICKERS: [&str; 5] = ["AAA", "BBB", "CCC", "DDD", "EEE"];

    struct Fixture;

    #[async_trait]
    impl CompanySource for Fixture {
        async fn fetch_companies(&self, offset: u64, limit: u64) -> Result<CompanyPage> {
            let companies: Vec<Company> = TICKERS
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|t| Company {
                    ticker: t.to_string(),
                    company_name: format!("{t} Holdings"),
                    company_desc: "chips".into(),
                    industry: Some("Semiconductors".into()),
                })
                .collect();
            Ok(CompanyPage {
                rows_returned: companies.len(),
                companies,
                total_count: TICKERS.len() as u64,
            })
        }
    }

    #[async_trait]
    impl PressReleaseSource for Fixture {
        async fn fetch_press_releases(
            &self,
            symbol: &str,
            _skip: u64,
            _limit: u64,
        ) -> Result<PressReleasePage> {
            Ok(PressReleasePage {
                press_releases: vec![PressRelease {
                    symbol: symbol.into(),
                    date: None,
                    pr_title: format!("{symbol} expands AI lineup"),
                    content: "details".into(),
                    pr_link: None,
                }],
                rows_returned: 1,
                total_count: 1,
            })
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 2,
            top_n: 4,
            ..PipelineConfig::default()
        }
    }

    /// Stand-in for the agent's judgement: a fixed score per ticker.
    fn score(ticker: &str) -> f64 {
        match ticker {
            "AAA" => 0.6,
            "BBB" => 0.9,
            "CCC" => 0.3,
            "DDD" => 0.8,
            _ => 0.7,
        }
    }

    async fn match_one_batch(stage: &mut MatchingStage, store: &MemoryArtifactStore, offset: u64) -> bool {
        let resp = stage.query_companies_response(offset, 2).await;
        assert!(resp.error.is_none(), "{:?}", resp.error);
        let matches: Vec<Value> = resp
            .companies
            .iter()
            .map(|c| json!({ "ticker": c.ticker, "company_name": c.company_name, "score": score(&c.ticker), "matched_themes": ["ai"] }))
            .collect();
        store
            .write(
                &BatchLayout::company_matches().key(offset),
                &json!({ "matches": matches }).to_string(),
            )
            .unwrap();
        resp.has_more
    }

    #[tokio::test]
    async fn full_pipeline_survives_a_restart() {
        let store = Arc::new(MemoryArtifactStore::new());
        let source = Arc::new(Fixture);

        // First process handles one batch and dies.
        {
            let mut matching = MatchingStage::new(store.clone(), source.clone(), config()).unwrap();
            assert!(match_one_batch(&mut matching, &store, 0).await);
        }

        // Second process resumes from the stored batches.
        let mut matching = MatchingStage::new(store.clone(), source.clone(), config()).unwrap();
        let replay = matching.query_companies_response(0, 2).await;
        assert!(replay.error.unwrap().contains("expected offset 2"));
        assert!(match_one_batch(&mut matching, &store, 2).await);
        assert!(!match_one_batch(&mut matching, &store, 4).await);

        let consolidated: Value = serde_json::from_str(&matching.consolidate()).unwrap();
        assert_eq!(consolidated["total_matches_found"], 5);
        assert_eq!(consolidated["top_companies_selected"], 4);

        // Validation: BBB, DDD, EEE, AAA in rank order. The agent validates
        // two companies, then the process dies with DDD's artifact written
        // but never observed.
        {
            let mut validation = ValidationStage::new(store.clone(), source.clone(), config());
            let queue: Value = serde_json::from_str(&validation.init_queue()).unwrap();
            assert_eq!(queue["companies"], json!(["BBB", "DDD", "EEE", "AAA"]));

            validation.query_press_releases_response("BBB", 0, 50).await;
            validation.write_artifact(
                "validations/company_BBB.json",
                r#"{"ticker":"BBB","adjusted_score":0.5}"#,
            );
            validation.query_press_releases_response("DDD", 0, 50).await;
            store
                .write("validations/company_DDD.json", r#"{"ticker":"DDD"}"#)
                .unwrap();
        }

        let mut validation = ValidationStage::new(store.clone(), source.clone(), config());
        let queue: Value = serde_json::from_str(&validation.init_queue()).unwrap();
        assert_eq!(queue["remaining"], 2);
        assert_eq!(queue["next"], "EEE");

        for ticker in ["EEE", "AAA"] {
            let resp = validation.query_press_releases_response(ticker, 0, 50).await;
            assert!(resp.error.is_none(), "{:?}", resp.error);
            validation.write_artifact(
                &format!("validations/company_{ticker}.json"),
                &json!({ "ticker": ticker }).to_string(),
            );
        }
        let exhausted = validation.query_press_releases_response("AAA", 0, 50).await;
        assert!(exhausted.error.unwrap().contains("already processed"));

        let listing: Value =
            serde_json::from_str(&list_directory(store.as_ref(), "validations")).unwrap();
        assert_eq!(listing.as_array().unwrap().len(), 4);

        let folded: Value = serde_json::from_str(&validation.consolidate()).unwrap();
        assert_eq!(folded["total_validations"], 4);

        let ranking = RankingStage::new(store.clone(), config());
        let ranked: Value = serde_json::from_str(&ranking.merge_and_rank()).unwrap();
        assert_eq!(ranked["status"], "success");

        let final_output: FinalOutput =
            serde_json::from_str(&store.read(FINAL_RANKINGS).unwrap()).unwrap();
        let order: Vec<(&str, f64)> = final_output
            .companies
            .iter()
            .map(|c| (c.ticker.as_str(), c.final_score))
            .collect();
        assert_eq!(
            order,
            vec![("DDD", 0.8), ("EEE", 0.7), ("AAA", 0.6), ("BBB", 0.5)]
        );
        assert_eq!(final_output.metadata.total_companies_analyzed, 5);
        assert_eq!(
            final_output.metadata.validation_summary,
            "Validated 4 of 4 matched companies"
        );
    }
}
