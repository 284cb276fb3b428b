//! Shared types, error model, and configuration for stagegate.
//!
//! This crate is the foundation depended on by all other stagegate crates.
//! It provides:
//! - [`StageGateError`]: the unified error type
//! - Domain payload types ([`Company`], [`CompanyMatch`], [`CompanyValidation`], ...)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ModelConfig, PipelineConfig, PipelineSection, SourcesConfig, StorageConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    new_run_name,
};
pub use error::{Result, StageGateError};
pub use types::{
    Company, CompanyBatchResponse, CompanyMatch, CompanyMatchesOutput, CompanyPage,
    CompanyValidation, EvidenceItem, FinalCompanyRanking, FinalOutput, FinalOutputMetadata,
    MatchMetadata, PressRelease, PressReleaseBatchResponse, PressReleasePage, SummaryStatistics,
    ThemeSupport, ValidationMetadata, ValidationOutput,
};
