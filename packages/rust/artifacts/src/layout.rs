//! Artifact key naming.
//!
//! Names are part of the on-disk contract and must stay bit-for-bit stable:
//! - batch artifacts: `<dir>/batch_<offset, zero-padded to 4 digits>.json`
//! - per-identifier artifacts: `<dir>/<prefix>_<IDENTIFIER>.json`
//! - aggregates: fixed well-known names, overwritten in place

use crate::store::normalize_path;

/// Upstream transcript analysis, consumed by the matching stage.
pub const THEMES_ANALYSIS: &str = "themes_analysis.json";
/// Matches aggregate.
pub const MATCHED_COMPANIES: &str = "matched_companies.json";
/// Validations aggregate.
pub const VALIDATED_RESULTS: &str = "validated_results.json";
/// Final rankings aggregate.
pub const FINAL_RANKINGS: &str = "final_rankings.json";

/// Naming for per-batch artifacts in one stage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    dir: String,
}

impl BatchLayout {
    pub fn new(dir: impl Into<String>) -> Self {
        let dir: String = dir.into();
        Self {
            dir: normalize_path(&dir).trim_end_matches('/').to_string(),
        }
    }

    /// `company_matches/batch_NNNN.json`.
    pub fn company_matches() -> Self {
        Self::new("company_matches")
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn key(&self, offset: u64) -> String {
        format!("{}/batch_{offset:04}.json", self.dir)
    }

    pub fn pattern(&self) -> String {
        format!("{}/batch_*.json", self.dir)
    }

    /// Offset encoded in a batch key, or `None` if `path` is not one of ours.
    pub fn parse_offset(&self, path: &str) -> Option<u64> {
        let digits = normalize_path(path)
            .strip_prefix(self.dir.as_str())?
            .strip_prefix("/batch_")?
            .strip_suffix(".json")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Naming for per-identifier artifacts in one stage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    dir: String,
    prefix: String,
}

impl RecordLayout {
    pub fn new(dir: impl Into<String>, prefix: impl Into<String>) -> Self {
        let dir: String = dir.into();
        Self {
            dir: normalize_path(&dir).trim_end_matches('/').to_string(),
            prefix: prefix.into(),
        }
    }

    /// `validations/company_<TICKER>.json`.
    pub fn validations() -> Self {
        Self::new("validations", "company")
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Identifier is used verbatim (case-sensitive).
    pub fn key(&self, identifier: &str) -> String {
        format!("{}/{}_{identifier}.json", self.dir, self.prefix)
    }

    pub fn pattern(&self) -> String {
        format!("{}/{}_*.json", self.dir, self.prefix)
    }

    /// Identifier encoded in a record key, or `None` if `path` is not one of ours.
    pub fn parse_identifier<'a>(&self, path: &'a str) -> Option<&'a str> {
        let id = normalize_path(path)
            .strip_prefix(self.dir.as_str())?
            .strip_prefix('/')?
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".json")?;
        if id.is_empty() || id.contains('/') {
            return None;
        }
        Some(id)
    }
}
