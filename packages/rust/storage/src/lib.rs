//! libSQL-backed reference data sources.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the two
//! external datasets the pipeline gates access to:
//! - `companies`: paginated, deterministically ordered by ticker
//! - `press_releases`: documents filtered by a single symbol
//!
//! **Access rules:**
//! - CLI `import`: read-write via [`Storage::open`]
//! - stage queries: read-only via [`Storage::open_readonly`] is sufficient

mod migrations;

use std::path::Path;

use libsql::{Connection, Database, params};
use serde::Deserialize;

use stagegate_shared::{
    Company, CompanyPage, PressRelease, PressReleasePage, Result, StageGateError,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A company row as imported (columns may be null).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyRecord {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_desc: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    /// `1` (or null) excludes the company from pagination.
    #[serde(default)]
    pub no_refresh_flag: Option<i64>,
}

/// A press-release document as imported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PressReleaseRecord {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pr_link: Option<String>,
    /// Documents without announcements never match a query.
    #[serde(default = "default_true")]
    pub has_announcements: bool,
}

fn default_true() -> bool {
    true
}

fn storage_err(e: libsql::Error) -> StageGateError {
    StageGateError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StageGateError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StageGateError::Storage(format!(
                "source database not found at {} (run `stagegate import` first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StageGateError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(StageGateError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Company source
    // -----------------------------------------------------------------------

    /// Insert or replace a company keyed by ticker.
    pub async fn upsert_company(&self, company: &CompanyRecord) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO companies (ticker, company_name, company_desc, industry, sector, no_refresh_flag)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(ticker) DO UPDATE SET
                   company_name = excluded.company_name,
                   company_desc = excluded.company_desc,
                   industry = excluded.industry,
                   sector = excluded.sector,
                   no_refresh_flag = excluded.no_refresh_flag",
                params![
                    company.ticker.as_str(),
                    company.company_name.as_deref(),
                    company.company_desc.as_deref(),
                    company.industry.as_deref(),
                    company.sector.as_deref(),
                    company.no_refresh_flag,
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Number of companies eligible for pagination in `sector`.
    pub async fn count_companies(&self, sector: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM companies
                 WHERE COALESCE(no_refresh_flag, 1) <> 1 AND sector = ?1",
                params![sector],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// One page of eligible companies, ordered by ticker so repeated offsets
    /// see the same rows.
    pub async fn companies_page(&self, sector: &str, offset: u64, limit: u64) -> Result<CompanyPage> {
        let mut rows = self
            .conn
            .query(
                "SELECT ticker, company_name, company_desc, industry FROM companies
                 WHERE COALESCE(no_refresh_flag, 1) <> 1 AND sector = ?1
                 ORDER BY ticker
                 LIMIT ?2 OFFSET ?3",
                params![sector, limit as i64, offset as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut page = CompanyPage::default();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            page.rows_returned += 1;
            let company = Company::from_columns(
                row.get::<String>(0).ok(),
                row.get::<String>(1).ok(),
                row.get::<String>(2).ok(),
                row.get::<String>(3).ok(),
            );
            if let Some(company) = company {
                page.companies.push(company);
            }
        }
        page.total_count = self.count_companies(sector).await?;
        Ok(page)
    }

    // -----------------------------------------------------------------------
    // Press release source
    // -----------------------------------------------------------------------

    /// Append a press-release document.
    pub async fn insert_press_release(&self, release: &PressReleaseRecord) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO press_releases (symbol, date, pr_title, content, pr_link, has_announcements)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    release.symbol.as_deref(),
                    release.date.as_deref(),
                    release.pr_title.as_deref(),
                    release.content.as_deref(),
                    release.pr_link.as_deref(),
                    i64::from(release.has_announcements),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Number of announcement-bearing documents for `symbol`.
    pub async fn count_press_releases(&self, symbol: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM press_releases
                 WHERE symbol = ?1 AND has_announcements = 1",
                params![symbol],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// One page of documents for `symbol`, newest first.
    pub async fn press_releases_page(
        &self,
        symbol: &str,
        skip: u64,
        limit: u64,
    ) -> Result<PressReleasePage> {
        let mut rows = self
            .conn
            .query(
                "SELECT symbol, date, pr_title, content, pr_link FROM press_releases
                 WHERE symbol = ?1 AND has_announcements = 1
                 ORDER BY date DESC, pr_title, id
                 LIMIT ?2 OFFSET ?3",
                params![symbol, limit as i64, skip as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut page = PressReleasePage::default();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            page.rows_returned += 1;
            let release = PressRelease::from_columns(
                row.get::<String>(0).ok(),
                row.get::<String>(1).ok(),
                row.get::<String>(2).ok(),
                row.get::<String>(3).ok(),
                row.get::<String>(4).ok(),
            );
            if let Some(release) = release {
                page.press_releases.push(release);
            }
        }
        page.total_count = self.count_press_releases(symbol).await?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn company(ticker: &str, sector: &str, flag: Option<i64>) -> CompanyRecord {
        CompanyRecord {
            ticker: ticker.into(),
            company_name: Some(format!("{ticker} Inc")),
            company_desc: Some(format!("{ticker} makes things")),
            industry: Some("Semiconductors".into()),
            sector: Some(sector.into()),
            no_refresh_flag: flag,
        }
    }

    fn release(symbol: &str, date: &str, title: &str) -> PressReleaseRecord {
        PressReleaseRecord {
            symbol: Some(symbol.into()),
            date: Some(date.into()),
            pr_title: Some(title.into()),
            content: Some(format!("{title} body")),
            pr_link: None,
            has_announcements: true,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn companies_paginate_in_ticker_order() {
        let storage = test_storage().await;
        for ticker in ["MSFT", "AAPL", "NVDA", "AMD", "INTC"] {
            storage
                .upsert_company(&company(ticker, "Technology", Some(0)))
                .await
                .unwrap();
        }
        // Excluded: flagged, null flag, other sector.
        storage.upsert_company(&company("ZZZ", "Technology", Some(1))).await.unwrap();
        storage.upsert_company(&company("YYY", "Technology", None)).await.unwrap();
        storage.upsert_company(&company("XOM", "Energy", Some(0))).await.unwrap();

        let first = storage.companies_page("Technology", 0, 2).await.unwrap();
        let tickers: Vec<_> = first.companies.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "AMD"]);
        assert_eq!(first.total_count, 5);

        let last = storage.companies_page("Technology", 4, 2).await.unwrap();
        assert_eq!(last.rows_returned, 1);
        assert_eq!(last.companies[0].ticker, "NVDA");
    }

    #[tokio::test]
    async fn incomplete_company_rows_are_counted_but_dropped() {
        let storage = test_storage().await;
        let mut broken = company("AAA", "Technology", Some(0));
        broken.company_desc = None;
        storage.upsert_company(&broken).await.unwrap();
        storage.upsert_company(&company("BBB", "Technology", Some(0))).await.unwrap();

        let page = storage.companies_page("Technology", 0, 10).await.unwrap();
        assert_eq!(page.rows_returned, 2);
        assert_eq!(page.companies.len(), 1);
        assert_eq!(page.companies[0].ticker, "BBB");
    }

    #[tokio::test]
    async fn press_releases_filter_by_symbol() {
        let storage = test_storage().await;
        storage.insert_press_release(&release("NVDA", "2025-01-01", "Old")).await.unwrap();
        storage.insert_press_release(&release("NVDA", "2025-06-01", "New")).await.unwrap();
        storage.insert_press_release(&release("AMD", "2025-03-01", "Other")).await.unwrap();
        let mut quiet = release("NVDA", "2025-07-01", "No news");
        quiet.has_announcements = false;
        storage.insert_press_release(&quiet).await.unwrap();

        let page = storage.press_releases_page("NVDA", 0, 50).await.unwrap();
        let titles: Vec<_> = page.press_releases.iter().map(|p| p.pr_title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
        assert_eq!(page.total_count, 2);

        let truncated = storage.press_releases_page("NVDA", 0, 1).await.unwrap();
        assert_eq!(truncated.rows_returned, 1);
        assert_eq!(truncated.total_count, 2);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        let _rw = Storage::open(&tmp).await.expect("create");
        drop(_rw);

        let ro = Storage::open_readonly(&tmp).await.expect("open readonly");
        let err = ro
            .upsert_company(&company("AAPL", "Technology", Some(0)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_database() {
        let tmp = std::env::temp_dir().join(format!("sg_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
