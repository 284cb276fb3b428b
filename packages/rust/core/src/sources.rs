//! External data sources the stages gate access to.
//!
//! The traits are the seam: stages only see [`CompanySource`] and
//! [`PressReleaseSource`]. [`LibsqlSources`] backs both with the local
//! libSQL reference database.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use stagegate_shared::{CompanyPage, PressReleasePage, Result};
use stagegate_storage::Storage;

/// Paginated, deterministically ordered company table.
#[async_trait]
pub trait CompanySource: Send + Sync {
    /// Rows `offset..offset + limit` plus the total row count.
    async fn fetch_companies(&self, offset: u64, limit: u64) -> Result<CompanyPage>;
}

/// Press-release documents filtered by a single symbol.
#[async_trait]
pub trait PressReleaseSource: Send + Sync {
    async fn fetch_press_releases(
        &self,
        symbol: &str,
        skip: u64,
        limit: u64,
    ) -> Result<PressReleasePage>;
}

/// Both sources served from one libSQL database.
///
/// The database can be opened up front or on the first query, so commands
/// that never touch a source do not need it to exist.
pub struct LibsqlSources {
    path: PathBuf,
    sector: String,
    storage: OnceCell<Arc<Storage>>,
}

impl LibsqlSources {
    /// Serve from an already open database; companies are restricted to
    /// `sector`.
    pub fn new(storage: Arc<Storage>, sector: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            sector: sector.into(),
            storage: OnceCell::new_with(Some(storage)),
        }
    }

    /// Open the database at `path` read-only on first use.
    pub fn open_lazily(path: impl Into<PathBuf>, sector: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sector: sector.into(),
            storage: OnceCell::new(),
        }
    }

    async fn storage(&self) -> Result<&Storage> {
        let storage = self
            .storage
            .get_or_try_init(|| async {
                debug!(path = %self.path.display(), "opening source database");
                Storage::open_readonly(&self.path).await.map(Arc::new)
            })
            .await?;
        Ok(storage.as_ref())
    }
}

#[async_trait]
impl CompanySource for LibsqlSources {
    async fn fetch_companies(&self, offset: u64, limit: u64) -> Result<CompanyPage> {
        self.storage()
            .await?
            .companies_page(&self.sector, offset, limit)
            .await
    }
}

#[async_trait]
impl PressReleaseSource for LibsqlSources {
    async fn fetch_press_releases(
        &self,
        symbol: &str,
        skip: u64,
        limit: u64,
    ) -> Result<PressReleasePage> {
        self.storage()
            .await?
            .press_releases_page(symbol, skip, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegate_storage::{CompanyRecord, PressReleaseRecord};
    use uuid::Uuid;

    async fn seeded() -> LibsqlSources {
        let path = std::env::temp_dir().join(format!("sg_sources_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();

        for (ticker, sector) in [("AMD", "Technology"), ("NVDA", "Technology"), ("XOM", "Energy")] {
            storage
                .upsert_company(&CompanyRecord {
                    ticker: ticker.into(),
                    company_name: Some(format!("{ticker} Inc")),
                    company_desc: Some("desc".into()),
                    industry: None,
                    sector: Some(sector.into()),
                    no_refresh_flag: Some(0),
                })
                .await
                .unwrap();
        }
        storage
            .insert_press_release(&PressReleaseRecord {
                symbol: Some("NVDA".into()),
                date: Some("2025-02-01".into()),
                pr_title: Some("NVDA ships".into()),
                content: Some("body".into()),
                pr_link: None,
                has_announcements: true,
            })
            .await
            .unwrap();

        LibsqlSources::new(Arc::new(storage), "Technology")
    }

    #[tokio::test]
    async fn companies_are_scoped_to_sector() {
        let sources = seeded().await;
        let page = sources.fetch_companies(0, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.companies[0].ticker, "AMD");
    }

    #[tokio::test]
    async fn lazy_sources_open_on_first_query() {
        let missing = std::env::temp_dir().join(format!("sg_missing_{}.db", Uuid::now_v7()));
        let sources = LibsqlSources::open_lazily(&missing, "Technology");
        let err = sources.fetch_companies(0, 10).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn press_releases_for_one_symbol() {
        let sources = seeded().await;
        let page = sources.fetch_press_releases("NVDA", 0, 50).await.unwrap();
        assert_eq!(page.press_releases.len(), 1);
        assert!(sources
            .fetch_press_releases("AMD", 0, 50)
            .await
            .unwrap()
            .press_releases
            .is_empty());
    }
}
