//! Consolidators: fold per-batch and per-identifier artifacts into one
//! aggregate artifact.
//!
//! The folds themselves are pure ([`fold_matches`], [`fold_validations`]);
//! the `consolidate_*` runners read the artifacts, fold them and write the
//! aggregate. A corrupt artifact is skipped and recorded in the aggregate's
//! metadata instead of aborting the whole run.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use stagegate_artifacts::{
    ArtifactStore, BatchLayout, MATCHED_COMPANIES, RecordLayout, VALIDATED_RESULTS,
};
use stagegate_shared::{
    CompanyMatch, CompanyMatchesOutput, CompanyValidation, MatchMetadata, Result,
    StageGateError, SummaryStatistics, ValidationMetadata, ValidationOutput,
};

/// Outcome of a consolidation run.
#[derive(Debug, Clone, PartialEq)]
pub enum Consolidation<T> {
    /// The aggregate was written.
    Written(T),
    /// No artifacts matched `pattern`; nothing was written.
    NothingToDo { pattern: String },
}

/// Score histogram buckets over the retained matches, highest first.
const SCORE_BUCKETS: [(&str, f64, f64); 4] = [
    ("0.95-1.00", 0.95, f64::INFINITY),
    ("0.90-0.94", 0.90, 0.95),
    ("0.85-0.89", 0.85, 0.90),
    ("0.80-0.84", 0.80, 0.85),
];

// ---------------------------------------------------------------------------
// Batch matches
// ---------------------------------------------------------------------------

/// One parsed batch artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMatches {
    pub path: String,
    /// Offset parsed from the key, if it follows the batch naming.
    pub offset: Option<u64>,
    pub matches: Vec<CompanyMatch>,
}

#[derive(Deserialize)]
struct BatchFile {
    #[serde(default, alias = "preliminary_matches")]
    matches: Vec<CompanyMatch>,
}

/// Parse the body of a batch artifact (`{"matches": [...]}`).
pub fn parse_batch_artifact(content: &str) -> Result<Vec<CompanyMatch>> {
    serde_json::from_str::<BatchFile>(content)
        .map(|file| file.matches)
        .map_err(|e| StageGateError::parse(format!("invalid batch artifact: {e}")))
}

/// Merge batch artifacts into the top-N matches aggregate.
///
/// Batches are folded in offset order, so the result does not depend on
/// the order they were listed in. Ties on score keep encounter order.
pub fn fold_matches(
    mut batches: Vec<BatchMatches>,
    skipped_paths: Vec<String>,
    top_n: usize,
    date: NaiveDate,
) -> CompanyMatchesOutput {
    batches.sort_by(|a, b| {
        let key = |batch: &BatchMatches| batch.offset.unwrap_or(u64::MAX);
        key(a).cmp(&key(b)).then_with(|| a.path.cmp(&b.path))
    });

    let total_batches_processed = batches.len();
    let mut all: Vec<CompanyMatch> = batches.into_iter().flat_map(|b| b.matches).collect();

    let themes_analyzed: Vec<String> = all
        .iter()
        .flat_map(|m| m.matched_themes.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let total_companies_analyzed = all.len();

    all.sort_by(|a, b| b.score.total_cmp(&a.score));
    all.truncate(top_n);
    for (i, m) in all.iter_mut().enumerate() {
        m.rank = i + 1;
    }

    let summary_statistics = summarize(&all);

    CompanyMatchesOutput {
        metadata: MatchMetadata {
            total_companies_analyzed,
            total_batches_processed,
            analysis_completion_date: date.format("%Y-%m-%d").to_string(),
            themes_analyzed,
            skipped_artifacts: skipped_paths.len(),
            skipped_paths,
        },
        matches: all,
        summary_statistics,
    }
}

fn summarize(top: &[CompanyMatch]) -> SummaryStatistics {
    let mut theme_distribution = BTreeMap::new();
    let mut industry_representation = BTreeMap::new();
    for m in top {
        for theme in &m.matched_themes {
            *theme_distribution.entry(theme.clone()).or_insert(0) += 1;
        }
        if let Some(industry) = &m.industry {
            *industry_representation.entry(industry.clone()).or_insert(0) += 1;
        }
    }

    let score_ranges = SCORE_BUCKETS
        .iter()
        .map(|(label, lo, hi)| {
            let count = top.iter().filter(|m| m.score >= *lo && m.score < *hi).count();
            (label.to_string(), count)
        })
        .collect();

    let average_score = if top.is_empty() {
        0.0
    } else {
        let mean = top.iter().map(|m| m.score).sum::<f64>() / top.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    SummaryStatistics {
        theme_distribution,
        average_score,
        score_ranges,
        industry_representation,
    }
}

/// Read every batch artifact under `layout`, fold them and write
/// `matched_companies.json`.
#[instrument(skip_all, fields(pattern = %layout.pattern(), top_n = top_n))]
pub fn consolidate_matches<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &BatchLayout,
    top_n: usize,
    date: NaiveDate,
) -> Result<Consolidation<CompanyMatchesOutput>> {
    let pattern = layout.pattern();
    let listed = store.list(&pattern)?;
    if listed.is_empty() {
        info!("no batch artifacts to consolidate");
        return Ok(Consolidation::NothingToDo { pattern });
    }

    let mut batches = Vec::with_capacity(listed.len());
    let mut skipped = Vec::new();
    for entry in listed {
        let content = store.read(&entry.path)?;
        match parse_batch_artifact(&content) {
            Ok(matches) => batches.push(BatchMatches {
                offset: layout.parse_offset(&entry.path),
                path: entry.path,
                matches,
            }),
            Err(e) => {
                warn!(path = %entry.path, error = %e, "skipping unreadable batch artifact");
                skipped.push(entry.path);
            }
        }
    }

    let output = fold_matches(batches, skipped, top_n, date);
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| StageGateError::parse(e.to_string()))?;
    store.write(MATCHED_COMPANIES, &json)?;

    info!(
        total = output.metadata.total_companies_analyzed,
        kept = output.matches.len(),
        batches = output.metadata.total_batches_processed,
        skipped = output.metadata.skipped_artifacts,
        "consolidated batch matches"
    );
    Ok(Consolidation::Written(output))
}

// ---------------------------------------------------------------------------
// Validations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ValidationFile {
    Many(Vec<CompanyValidation>),
    One(Box<CompanyValidation>),
}

/// Parse a per-identifier artifact holding one validation or a list.
pub fn parse_validation_artifact(content: &str) -> Result<Vec<CompanyValidation>> {
    match serde_json::from_str::<ValidationFile>(content) {
        Ok(ValidationFile::Many(list)) => Ok(list),
        Ok(ValidationFile::One(one)) => Ok(vec![*one]),
        Err(e) => Err(StageGateError::parse(format!(
            "invalid validation artifact: {e}"
        ))),
    }
}

/// Flatten parsed per-identifier artifacts, in the given order, into the
/// validations aggregate.
pub fn fold_validations(
    files: Vec<Vec<CompanyValidation>>,
    skipped_paths: Vec<String>,
    date: NaiveDate,
) -> ValidationOutput {
    let files_processed = files.len();
    let validations: Vec<CompanyValidation> = files.into_iter().flatten().collect();
    ValidationOutput {
        total_validations: validations.len(),
        validations,
        metadata: ValidationMetadata {
            consolidation_date: date.format("%Y-%m-%d").to_string(),
            files_processed,
            skipped_artifacts: skipped_paths.len(),
            skipped_paths,
        },
    }
}

/// Read every per-identifier artifact under `layout`, fold them and write
/// `validated_results.json`.
#[instrument(skip_all, fields(pattern = %layout.pattern()))]
pub fn consolidate_validations<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &RecordLayout,
    date: NaiveDate,
) -> Result<Consolidation<ValidationOutput>> {
    let pattern = layout.pattern();
    let mut listed = store.list(&pattern)?;
    if listed.is_empty() {
        info!("no validation artifacts to consolidate");
        return Ok(Consolidation::NothingToDo { pattern });
    }
    listed.sort_by(|a, b| a.path.cmp(&b.path));

    let mut files = Vec::with_capacity(listed.len());
    let mut skipped = Vec::new();
    for entry in listed {
        let content = store.read(&entry.path)?;
        match parse_validation_artifact(&content) {
            Ok(records) => files.push(records),
            Err(e) => {
                warn!(path = %entry.path, error = %e, "skipping unreadable validation artifact");
                skipped.push(entry.path);
            }
        }
    }

    let output = fold_validations(files, skipped, date);
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| StageGateError::parse(e.to_string()))?;
    store.write(VALIDATED_RESULTS, &json)?;

    info!(
        validations = output.total_validations,
        files = output.metadata.files_processed,
        skipped = output.metadata.skipped_artifacts,
        "consolidated validations"
    );
    Ok(Consolidation::Written(output))
}
