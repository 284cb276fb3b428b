//! Domain payload types exchanged between stages.
//!
//! Per-batch and per-identifier artifacts are written by a driving agent, so
//! deserialization is lenient: only identity fields are required, everything
//! else falls back to a default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source records
// ---------------------------------------------------------------------------

/// A single company row from the company table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Stock ticker symbol.
    pub ticker: String,
    pub company_name: String,
    pub company_desc: String,
    #[serde(default)]
    pub industry: Option<String>,
}

impl Company {
    /// Build a company from nullable columns; `None` when a required field is
    /// missing or empty.
    pub fn from_columns(
        ticker: Option<String>,
        company_name: Option<String>,
        company_desc: Option<String>,
        industry: Option<String>,
    ) -> Option<Self> {
        let ticker = ticker.filter(|s| !s.is_empty())?;
        let company_name = company_name.filter(|s| !s.is_empty())?;
        let company_desc = company_desc.filter(|s| !s.is_empty())?;
        Some(Self {
            ticker,
            company_name,
            company_desc,
            industry,
        })
    }
}

/// Response of a gated company batch query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyBatchResponse {
    /// Set when the query was rejected or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub companies: Vec<Company>,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
    pub returned: usize,
    pub has_more: bool,
}

impl CompanyBatchResponse {
    /// Empty response carrying an error message.
    pub fn rejected(error: impl Into<String>, offset: u64, limit: u64) -> Self {
        Self {
            error: Some(error.into()),
            companies: Vec::new(),
            total_count: 0,
            offset,
            limit,
            returned: 0,
            has_more: false,
        }
    }
}

/// A single press release document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressRelease {
    pub symbol: String,
    #[serde(default)]
    pub date: Option<String>,
    pub pr_title: String,
    pub content: String,
    #[serde(default)]
    pub pr_link: Option<String>,
}

impl PressRelease {
    /// Build a press release from nullable fields; `None` when symbol, title
    /// or content is missing or empty.
    pub fn from_columns(
        symbol: Option<String>,
        date: Option<String>,
        pr_title: Option<String>,
        content: Option<String>,
        pr_link: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            symbol: symbol.filter(|s| !s.is_empty())?,
            date,
            pr_title: pr_title.filter(|s| !s.is_empty())?,
            content: content.filter(|s| !s.is_empty())?,
            pr_link,
        })
    }
}

/// Response of a gated press-release query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressReleaseBatchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub press_releases: Vec<PressRelease>,
    pub total_count: u64,
    /// Always 0 for accepted queries.
    pub skip: u64,
    pub limit: u64,
    pub returned: usize,
    /// True when the identifier has more documents than fit in one page.
    pub has_more: bool,
}

impl PressReleaseBatchResponse {
    /// Empty response carrying an error message.
    pub fn rejected(error: impl Into<String>, skip: u64, limit: u64) -> Self {
        Self {
            error: Some(error.into()),
            press_releases: Vec::new(),
            total_count: 0,
            skip,
            limit,
            returned: 0,
            has_more: false,
        }
    }
}

/// One page of the company source, as returned by the external collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyPage {
    /// Rows that carried every required field.
    pub companies: Vec<Company>,
    /// Raw rows the source returned, before dropping incomplete ones.
    pub rows_returned: usize,
    /// Rows matching the source filter across all pages.
    pub total_count: u64,
}

/// One page of press releases for a single identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PressReleasePage {
    pub press_releases: Vec<PressRelease>,
    pub rows_returned: usize,
    pub total_count: u64,
}

// ---------------------------------------------------------------------------
// Matches aggregate
// ---------------------------------------------------------------------------

/// A company matched against the transcript themes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMatch {
    pub ticker: String,
    pub company_name: String,
    /// Dense 1-based rank; reassigned by consolidation.
    #[serde(default)]
    pub rank: usize,
    /// Match score in `0.0..=1.0`.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub matched_themes: Vec<String>,
    #[serde(default)]
    pub alignment_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

/// Provenance of the matches aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    /// Matches found across every batch, before truncation.
    #[serde(default)]
    pub total_companies_analyzed: usize,
    #[serde(default)]
    pub total_batches_processed: usize,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub analysis_completion_date: String,
    /// Sorted union of every theme referenced by any match.
    #[serde(default)]
    pub themes_analyzed: Vec<String>,
    /// Batch artifacts that could not be parsed and were left out.
    #[serde(default)]
    pub skipped_artifacts: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_paths: Vec<String>,
}

/// Statistics over the retained top-N matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    #[serde(default)]
    pub theme_distribution: BTreeMap<String, usize>,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub score_ranges: BTreeMap<String, usize>,
    #[serde(default)]
    pub industry_representation: BTreeMap<String, usize>,
}

/// `matched_companies.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMatchesOutput {
    #[serde(default)]
    pub metadata: MatchMetadata,
    #[serde(alias = "top_100_matches")]
    pub matches: Vec<CompanyMatch>,
    #[serde(default)]
    pub summary_statistics: SummaryStatistics,
}

// ---------------------------------------------------------------------------
// Validations aggregate
// ---------------------------------------------------------------------------

/// One piece of press-release evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence: String,
    #[serde(default)]
    pub pr_title: String,
    #[serde(default)]
    pub pr_link: Option<String>,
}

/// Whether press releases support the matched themes. Agents write either a
/// boolean or a descriptive string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThemeSupport {
    Flag(bool),
    Text(String),
}

/// Per-company validation written by the press-release stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyValidation {
    pub ticker: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub original_themes: Vec<String>,
    #[serde(default)]
    pub original_score: f64,
    #[serde(default)]
    pub press_release_validation: Option<String>,
    #[serde(default)]
    pub supports_themes: Option<ThemeSupport>,
    #[serde(default)]
    pub evidence_summary: Option<String>,
    #[serde(default)]
    pub validation_status: Option<String>,
    #[serde(default)]
    pub confidence_adjustment: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Score after applying the confidence adjustment; takes precedence in
    /// final ranking when present.
    #[serde(default)]
    pub adjusted_score: Option<f64>,
    #[serde(default)]
    pub key_evidence: Option<Vec<EvidenceItem>>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    #[serde(default)]
    pub consolidation_date: String,
    #[serde(default)]
    pub files_processed: usize,
    #[serde(default)]
    pub skipped_artifacts: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_paths: Vec<String>,
}

/// `validated_results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub total_validations: usize,
    pub validations: Vec<CompanyValidation>,
    #[serde(default)]
    pub metadata: ValidationMetadata,
}

// ---------------------------------------------------------------------------
// Final rankings
// ---------------------------------------------------------------------------

/// A match joined with its (optional) validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalCompanyRanking {
    pub ticker: String,
    pub company_name: String,
    pub rank: usize,
    pub final_score: f64,
    pub original_score: f64,
    pub matched_themes: Vec<String>,
    pub alignment_factors: Vec<String>,
    pub validation_status: Option<String>,
    pub press_release_validation: Option<String>,
    pub evidence_summary: Option<String>,
    pub key_evidence: Option<Vec<EvidenceItem>>,
    pub confidence_adjustment: Option<f64>,
    pub adjusted_score: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutputMetadata {
    pub total_companies_analyzed: usize,
    pub total_companies_validated: usize,
    pub analysis_completion_date: String,
    pub themes_analyzed: Vec<String>,
    pub validation_summary: String,
}

/// `final_rankings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub metadata: FinalOutputMetadata,
    pub companies: Vec<FinalCompanyRanking>,
    pub summary_statistics: SummaryStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_requires_identity_columns() {
        assert!(Company::from_columns(
            Some("NVDA".into()),
            Some("NVIDIA".into()),
            Some("GPUs".into()),
            None
        )
        .is_some());
        assert!(Company::from_columns(Some("NVDA".into()), None, Some("GPUs".into()), None)
            .is_none());
        assert!(Company::from_columns(
            Some(String::new()),
            Some("NVIDIA".into()),
            Some("GPUs".into()),
            None
        )
        .is_none());
    }

    #[test]
    fn press_release_requires_title_and_content() {
        let pr = PressRelease::from_columns(
            Some("AMD".into()),
            Some("2025-01-02".into()),
            Some("AMD launches".into()),
            None,
            None,
        );
        assert!(pr.is_none());
    }

    #[test]
    fn match_defaults_missing_fields() {
        let m: CompanyMatch =
            serde_json::from_str(r#"{"ticker":"AAPL","company_name":"Apple"}"#).unwrap();
        assert_eq!(m.score, 0.0);
        assert_eq!(m.rank, 0);
        assert!(m.matched_themes.is_empty());
    }

    #[test]
    fn matches_output_accepts_legacy_key() {
        let json = r#"{"top_100_matches":[{"ticker":"A","company_name":"A Inc","score":0.5}]}"#;
        let out: CompanyMatchesOutput = serde_json::from_str(json).unwrap();
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.metadata.total_batches_processed, 0);
    }

    #[test]
    fn validation_accepts_bool_or_text_support() {
        let v: CompanyValidation = serde_json::from_str(
            r#"{"ticker":"MSFT","supports_themes":true,"adjusted_score":null}"#,
        )
        .unwrap();
        assert_eq!(v.supports_themes, Some(ThemeSupport::Flag(true)));
        assert_eq!(v.adjusted_score, None);

        let v: CompanyValidation =
            serde_json::from_str(r#"{"ticker":"MSFT","supports_themes":"partially"}"#).unwrap();
        assert_eq!(v.supports_themes, Some(ThemeSupport::Text("partially".into())));
    }

    #[test]
    fn rejected_response_serializes_error() {
        let r = CompanyBatchResponse::rejected("out of order", 50, 100);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["error"], "out of order");
        assert_eq!(json["has_more"], false);
        assert_eq!(json["offset"], 50);
    }
}
