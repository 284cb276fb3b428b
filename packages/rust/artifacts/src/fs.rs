//! Filesystem artifact store.
//!
//! Layout:
//! ```text
//! <root>/
//! ├── transcripts/ ...                 (shared inputs, read verbatim)
//! └── <run_prefix>/<run_name>/
//!     ├── themes_analysis.json
//!     ├── company_matches/batch_0000.json
//!     ├── matched_companies.json
//!     ├── validations/company_NVDA.json
//!     ├── validated_results.json
//!     └── final_rankings.json
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

use stagegate_shared::{Result, StageGateError, StorageConfig, expand_home};

use crate::store::{ArtifactInfo, ArtifactStore, check_path, compile_pattern, pattern_matches};

/// Artifact store rooted in a directory, scoped to one run.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    run_dir: PathBuf,
    shared_prefixes: Vec<String>,
}

impl FsArtifactStore {
    /// Open (creating if needed) the run directory `<root>/<run_prefix>/<run_name>`.
    pub fn open(
        root: impl Into<PathBuf>,
        run_prefix: &str,
        run_name: &str,
        shared_prefixes: Vec<String>,
    ) -> Result<Self> {
        if run_name.is_empty() || run_name.contains('/') || run_name.starts_with('.') {
            return Err(StageGateError::validation(format!(
                "invalid run name '{run_name}'"
            )));
        }

        let root = root.into();
        let run_dir = root.join(run_prefix.trim_matches('/')).join(run_name);
        std::fs::create_dir_all(&run_dir).map_err(|e| StageGateError::io(&run_dir, e))?;

        info!(run_dir = %run_dir.display(), "opened artifact store");

        Ok(Self {
            root,
            run_dir,
            shared_prefixes: shared_prefixes
                .into_iter()
                .map(|p| p.trim_start_matches('/').to_string())
                .collect(),
        })
    }

    /// Open the store described by the `[storage]` config section.
    pub fn from_config(config: &StorageConfig, run_name: &str) -> Result<Self> {
        Self::open(
            expand_home(&config.artifact_root),
            &config.run_prefix,
            run_name,
            config.shared_prefixes.clone(),
        )
    }

    /// Directory holding this run's artifacts.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn is_shared(&self, clean: &str) -> bool {
        self.shared_prefixes.iter().any(|p| clean.starts_with(p.as_str()))
    }

    /// Map an artifact path to its file; shared inputs bypass the run scope.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let clean = check_path(path)?;
        if self.is_shared(clean) {
            Ok(self.root.join(clean))
        } else {
            Ok(self.run_dir.join(clean))
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn list(&self, pattern: &str) -> Result<Vec<ArtifactInfo>> {
        let compiled = compile_pattern(pattern)?;
        let base = if self.is_shared(crate::store::normalize_path(pattern)) {
            &self.root
        } else {
            &self.run_dir
        };

        let mut results: Vec<ArtifactInfo> = walk(base)?
            .into_iter()
            .filter(|(rel, _, _)| pattern_matches(&compiled, rel))
            .map(|(path, size, modified)| ArtifactInfo {
                path,
                size,
                modified,
            })
            .collect();
        results.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(pattern, matched = results.len(), "listed artifacts");
        Ok(results)
    }

    fn read(&self, path: &str) -> Result<String> {
        let file = self.resolve(path)?;
        std::fs::read_to_string(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StageGateError::not_found(path),
            _ => StageGateError::io(&file, e),
        })
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let file = self.resolve(path)?;
        let parent = file
            .parent()
            .ok_or_else(|| StageGateError::validation(format!("no parent for '{path}'")))?;
        std::fs::create_dir_all(parent).map_err(|e| StageGateError::io(parent, e))?;

        // Write-then-rename keeps readers from ever seeing a partial artifact.
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));
        std::fs::write(&tmp, content).map_err(|e| StageGateError::io(&tmp, e))?;
        std::fs::rename(&tmp, &file).map_err(|e| StageGateError::io(&file, e))?;

        debug!(path, bytes = content.len(), "wrote artifact");
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }
}

/// Collect `(relative path, size, modified)` for every file under `base`.
/// Hidden entries (temp files) are pruned; a missing directory yields nothing.
fn walk(base: &Path) -> Result<Vec<(String, u64, DateTime<Utc>)>> {
    let mut out = Vec::new();
    if !base.is_dir() {
        return Ok(out);
    }

    let entries = WalkDir::new(base).min_depth(1).into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    });

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(base).to_path_buf();
                match e.into_io_error() {
                    // Removed between listing and stat.
                    Some(io) if io.kind() == std::io::ErrorKind::NotFound => continue,
                    Some(io) => return Err(StageGateError::io(path, io)),
                    None => {
                        return Err(StageGateError::Storage(format!(
                            "filesystem loop at {}",
                            path.display()
                        )));
                    }
                }
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| StageGateError::Storage(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let meta = entry
            .metadata()
            .map_err(|e| StageGateError::Storage(format!("{}: {e}", entry.path().display())))?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        out.push((rel, meta.len(), modified));
    }
    Ok(out)
}
