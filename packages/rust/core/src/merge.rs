//! Merge/rank engine: join the matches aggregate with the validations
//! aggregate and re-rank by final score.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, instrument};

use stagegate_artifacts::{ArtifactStore, FINAL_RANKINGS, MATCHED_COMPANIES, VALIDATED_RESULTS};
use stagegate_shared::{
    CompanyMatch, CompanyMatchesOutput, CompanyValidation, FinalCompanyRanking, FinalOutput,
    FinalOutputMetadata, Result, StageGateError, ValidationOutput,
};

/// Score used for ranking: the validation's adjusted score when it has one
/// (zero included), otherwise the original match score.
pub fn final_score(matched: &CompanyMatch, validation: Option<&CompanyValidation>) -> f64 {
    validation
        .and_then(|v| v.adjusted_score)
        .unwrap_or(matched.score)
}

/// Join every match with its validation (by ticker), sort by final score
/// descending, keep the top `top_n` and assign dense ranks.
///
/// When a ticker has several validations the last one wins.
pub fn merge_rankings(
    matches: &CompanyMatchesOutput,
    validations: &[CompanyValidation],
    top_n: usize,
    date: NaiveDate,
) -> FinalOutput {
    let by_ticker: HashMap<&str, &CompanyValidation> = validations
        .iter()
        .map(|v| (v.ticker.as_str(), v))
        .collect();

    let mut merged: Vec<FinalCompanyRanking> = matches
        .matches
        .iter()
        .map(|m| {
            let v = by_ticker.get(m.ticker.as_str()).copied();
            FinalCompanyRanking {
                ticker: m.ticker.clone(),
                company_name: m.company_name.clone(),
                rank: 0,
                final_score: final_score(m, v),
                original_score: m.score,
                matched_themes: m.matched_themes.clone(),
                alignment_factors: m.alignment_factors.clone(),
                validation_status: v.and_then(|v| v.validation_status.clone()),
                press_release_validation: v.and_then(|v| v.press_release_validation.clone()),
                evidence_summary: v.and_then(|v| v.evidence_summary.clone()),
                key_evidence: v.and_then(|v| v.key_evidence.clone()),
                confidence_adjustment: v.and_then(|v| v.confidence_adjustment),
                adjusted_score: v.and_then(|v| v.adjusted_score),
                notes: v.and_then(|v| v.notes.clone()),
            }
        })
        .collect();

    let matched_total = merged.len();
    merged.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    merged.truncate(top_n);
    for (i, company) in merged.iter_mut().enumerate() {
        company.rank = i + 1;
    }

    FinalOutput {
        metadata: FinalOutputMetadata {
            total_companies_analyzed: matches.metadata.total_companies_analyzed,
            total_companies_validated: by_ticker.len(),
            analysis_completion_date: date.format("%Y-%m-%d").to_string(),
            themes_analyzed: matches.metadata.themes_analyzed.clone(),
            validation_summary: format!(
                "Validated {} of {matched_total} matched companies",
                by_ticker.len()
            ),
        },
        companies: merged,
        summary_statistics: matches.summary_statistics.clone(),
    }
}

/// Read both aggregates, merge them and write `final_rankings.json`.
///
/// A missing validations aggregate means no validations; a corrupt one is
/// an error.
#[instrument(skip_all, fields(top_n = top_n))]
pub fn merge_and_rank<S: ArtifactStore + ?Sized>(
    store: &S,
    top_n: usize,
    date: NaiveDate,
) -> Result<FinalOutput> {
    let matches: CompanyMatchesOutput = serde_json::from_str(&store.read(MATCHED_COMPANIES)?)
        .map_err(|e| StageGateError::parse(format!("{MATCHED_COMPANIES}: {e}")))?;

    let validations = match store.read(VALIDATED_RESULTS) {
        Ok(content) => serde_json::from_str::<ValidationOutput>(&content)
            .map_err(|e| StageGateError::parse(format!("{VALIDATED_RESULTS}: {e}")))?
            .validations,
        Err(e) if e.is_not_found() => {
            info!("no validations aggregate; ranking on match scores only");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let output = merge_rankings(&matches, &validations, top_n, date);
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| StageGateError::parse(e.to_string()))?;
    store.write(FINAL_RANKINGS, &json)?;

    info!(
        ranked = output.companies.len(),
        validated = output.metadata.total_companies_validated,
        "final rankings written"
    );
    Ok(output)
}
