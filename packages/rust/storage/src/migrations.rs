//! SQL migration definitions for the reference source database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: companies, press_releases",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Company detail table (paginated relational source)
CREATE TABLE IF NOT EXISTS companies (
    ticker          TEXT PRIMARY KEY,
    company_name    TEXT,
    company_desc    TEXT,
    industry        TEXT,
    sector          TEXT,
    no_refresh_flag INTEGER
);

CREATE INDEX IF NOT EXISTS idx_companies_sector ON companies(sector);

-- Press release documents (document source filtered by symbol)
CREATE TABLE IF NOT EXISTS press_releases (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol            TEXT,
    date              TEXT,
    pr_title          TEXT,
    content           TEXT,
    pr_link           TEXT,
    has_announcements INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_press_releases_symbol ON press_releases(symbol);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
