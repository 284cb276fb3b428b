//! Seeding the reference source database from JSON exports.

use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use stagegate_shared::{Result, StageGateError};
use stagegate_storage::{CompanyRecord, PressReleaseRecord, Storage};

/// Result of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Records rejected before reaching the database.
    pub skipped: usize,
    pub elapsed: std::time::Duration,
}

/// Progress callback for long imports.
pub trait ProgressReporter: Send + Sync {
    /// Called once before the first record, with the record count.
    fn start(&self, what: &str, total: usize);
    /// Called after each record.
    fn record_done(&self, current: usize, total: usize);
    /// Called when the import completes.
    fn done(&self, summary: &ImportSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn start(&self, _what: &str, _total: usize) {}
    fn record_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &ImportSummary) {}
}

/// Parse a JSON array of records.
pub fn parse_records<T: DeserializeOwned>(content: &str) -> Result<Vec<T>> {
    serde_json::from_str(content)
        .map_err(|e| StageGateError::parse(format!("expected a JSON array of records: {e}")))
}

/// Upsert companies; rows without a ticker are skipped.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn import_companies(
    storage: &Storage,
    records: &[CompanyRecord],
    progress: &dyn ProgressReporter,
) -> Result<ImportSummary> {
    let start = Instant::now();
    let mut summary = ImportSummary::default();
    progress.start("companies", records.len());

    for (i, record) in records.iter().enumerate() {
        if record.ticker.trim().is_empty() {
            warn!(index = i, "skipping company without ticker");
            summary.skipped += 1;
        } else {
            storage.upsert_company(record).await?;
            summary.imported += 1;
        }
        progress.record_done(i + 1, records.len());
    }

    summary.elapsed = start.elapsed();
    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "companies imported"
    );
    progress.done(&summary);
    Ok(summary)
}

/// Append press releases; documents without a symbol are skipped.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn import_press_releases(
    storage: &Storage,
    records: &[PressReleaseRecord],
    progress: &dyn ProgressReporter,
) -> Result<ImportSummary> {
    let start = Instant::now();
    let mut summary = ImportSummary::default();
    progress.start("press releases", records.len());

    for (i, record) in records.iter().enumerate() {
        let has_symbol = record.symbol.as_deref().is_some_and(|s| !s.trim().is_empty());
        if has_symbol {
            storage.insert_press_release(record).await?;
            summary.imported += 1;
        } else {
            warn!(index = i, "skipping press release without symbol");
            summary.skipped += 1;
        }
        progress.record_done(i + 1, records.len());
    }

    summary.elapsed = start.elapsed();
    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "press releases imported"
    );
    progress.done(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingProgress {
        ticks: Mutex<Vec<usize>>,
    }

    impl ProgressReporter for CountingProgress {
        fn start(&self, _what: &str, _total: usize) {}
        fn record_done(&self, current: usize, _total: usize) {
            self.ticks.lock().unwrap().push(current);
        }
        fn done(&self, _summary: &ImportSummary) {}
    }

    async fn temp_storage() -> Storage {
        let path = std::env::temp_dir().join(format!("sg_import_{}.db", Uuid::now_v7()));
        Storage::open(&path).await.unwrap()
    }

    #[tokio::test]
    async fn imports_companies_and_skips_blank_tickers() {
        let storage = temp_storage().await;
        let records: Vec<CompanyRecord> = parse_records(
            r#"[
                {"ticker":"NVDA","company_name":"NVIDIA","company_desc":"GPUs","sector":"Technology","no_refresh_flag":0},
                {"ticker":"  ","company_name":"Nobody"},
                {"ticker":"AMD","company_name":"AMD","company_desc":"CPUs","sector":"Technology","no_refresh_flag":0}
            ]"#,
        )
        .unwrap();

        let progress = CountingProgress::default();
        let summary = import_companies(&storage, &records, &progress).await.unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(*progress.ticks.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(storage.count_companies("Technology").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn imports_press_releases() {
        let storage = temp_storage().await;
        let records: Vec<PressReleaseRecord> = parse_records(
            r#"[
                {"symbol":"NVDA","date":"2025-01-01","pr_title":"t","content":"c"},
                {"date":"2025-01-02","pr_title":"orphan","content":"c"}
            ]"#,
        )
        .unwrap();

        let summary = import_press_releases(&storage, &records, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(storage.count_press_releases("NVDA").await.unwrap(), 1);
    }

    #[test]
    fn non_array_input_is_a_parse_error() {
        let err = parse_records::<CompanyRecord>("{\"ticker\":\"A\"}").unwrap_err();
        assert!(matches!(err, StageGateError::Parse { .. }));
    }
}
