//! Durable artifact storage for stagegate runs.
//!
//! The artifact store is the single source of truth for "what has actually
//! completed": cursors and gates rebuild their progress by scanning it.
//!
//! - [`ArtifactStore`]: read / write / edit / list-by-pattern / ls over path-addressed blobs
//! - [`ArtifactIndex`]: the narrow scan interface recovery depends on
//! - [`FsArtifactStore`]: run-scoped directory tree with atomic writes
//! - [`MemoryArtifactStore`]: in-process store for tests and dry runs
//! - [`BatchLayout`] / [`RecordLayout`]: artifact key naming

pub mod fs;
pub mod layout;
pub mod memory;
pub mod store;

pub use fs::FsArtifactStore;
pub use layout::{
    BatchLayout, FINAL_RANKINGS, MATCHED_COMPANIES, RecordLayout, THEMES_ANALYSIS,
    VALIDATED_RESULTS,
};
pub use memory::MemoryArtifactStore;
pub use store::{ArtifactIndex, ArtifactInfo, ArtifactStore, DirEntry, normalize_path};
