//! Artifact store contract.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;

use stagegate_shared::{Result, StageGateError};

/// Listing entry for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    /// Run-relative path, no leading slash (e.g. `company_matches/batch_0000.json`).
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// One level of a directory listing. Directory paths end with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// Hierarchical key/value blob store addressed by path.
///
/// Writes are atomic per key and reads observe every completed write from
/// the same process. Leading `/` on any path is ignored.
pub trait ArtifactStore: Send + Sync {
    /// List artifacts whose path matches a glob `pattern`, sorted by path.
    fn list(&self, pattern: &str) -> Result<Vec<ArtifactInfo>>;

    /// Read a whole artifact. Returns [`StageGateError::NotFound`] when absent.
    fn read(&self, path: &str) -> Result<String>;

    /// Create or overwrite an artifact.
    fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Whether an artifact exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Read `limit` lines starting at line `offset`, rendered as
    /// `{line_no:6}|{line}` with 1-based line numbers.
    fn read_range(&self, path: &str, offset: usize, limit: usize) -> Result<String> {
        let content = self.read(path)?;
        let rendered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(i, line)| format!("{:6}|{line}", i + 1))
            .collect();

        if rendered.is_empty() {
            Ok("File is empty.".to_string())
        } else {
            Ok(rendered.join("\n"))
        }
    }

    /// Immediate children of `dir`: subdirectories first, then artifacts,
    /// each sorted by path. An empty `dir` lists the top level.
    fn ls(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let prefix = match normalize_path(dir).trim_end_matches('/') {
            "" => String::new(),
            d => format!("{d}/"),
        };
        let pattern = format!("{}**/*", Pattern::escape(&prefix));

        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        for info in self.list(&pattern)? {
            let Some(rest) = info.path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(format!("{prefix}{child}/"));
                }
                None => files.push(DirEntry {
                    path: info.path,
                    is_dir: false,
                    size: info.size,
                    modified: Some(info.modified),
                }),
            }
        }

        let mut entries: Vec<DirEntry> = dirs
            .into_iter()
            .map(|path| DirEntry {
                path,
                is_dir: true,
                size: 0,
                modified: None,
            })
            .collect();
        entries.extend(files);
        Ok(entries)
    }

    /// Replace `old` with `new` inside an artifact: every occurrence when
    /// `replace_all`, otherwise only the first. Returns how many were replaced.
    fn edit(&self, path: &str, old: &str, new: &str, replace_all: bool) -> Result<usize> {
        if old.is_empty() {
            return Err(StageGateError::validation("edit needs a non-empty search string"));
        }
        let content = self.read(path)?;
        let found = content.matches(old).count();
        if found == 0 {
            return Err(StageGateError::validation(format!(
                "string not found in {}",
                normalize_path(path)
            )));
        }

        let (updated, replaced) = if replace_all {
            (content.replace(old, new), found)
        } else {
            (content.replacen(old, new, 1), 1)
        };
        self.write(path, &updated)?;
        Ok(replaced)
    }
}

/// The scan interface progress recovery needs: list keys, probe one key.
///
/// Every [`ArtifactStore`] is an index; tests may implement this directly.
pub trait ArtifactIndex {
    fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;
    fn contains(&self, path: &str) -> Result<bool>;
}

impl<T: ArtifactStore + ?Sized> ArtifactIndex for T {
    fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.list(pattern)?.into_iter().map(|info| info.path).collect())
    }

    fn contains(&self, path: &str) -> Result<bool> {
        self.exists(path)
    }
}

/// Strip leading slashes so `/validations/x.json` and `validations/x.json`
/// address the same artifact.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Compile a listing pattern. `*` does not cross `/`.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(normalize_path(pattern))
        .map_err(|e| StageGateError::validation(format!("invalid pattern '{pattern}': {e}")))
}

pub(crate) fn pattern_matches(pattern: &Pattern, path: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    pattern.matches_with(path, options)
}

/// Reject paths that would escape the store root.
pub(crate) fn check_path(path: &str) -> Result<&str> {
    let clean = normalize_path(path);
    if clean.is_empty() {
        return Err(StageGateError::validation("artifact path is empty"));
    }
    if clean.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty()) {
        return Err(StageGateError::validation(format!(
            "artifact path '{path}' must not contain empty, '.' or '..' segments"
        )));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_slashes() {
        assert_eq!(normalize_path("/validations/a.json"), "validations/a.json");
        assert_eq!(normalize_path("validations/a.json"), "validations/a.json");
    }

    #[test]
    fn pattern_star_stays_within_segment() {
        let p = compile_pattern("/validations/company_*.json").unwrap();
        assert!(pattern_matches(&p, "validations/company_NVDA.json"));
        assert!(!pattern_matches(&p, "validations/nested/company_NVDA.json"));
        assert!(!pattern_matches(&p, "validations/Company_NVDA.json"));
    }

    #[test]
    fn check_path_rejects_traversal() {
        assert!(check_path("../etc/passwd").is_err());
        assert!(check_path("a//b.json").is_err());
        assert!(check_path("").is_err());
        assert_eq!(check_path("/a/b.json").unwrap(), "a/b.json");
    }
}
