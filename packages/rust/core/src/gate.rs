//! Record Gate: one-at-a-time, in-order, write-before-advance processing of
//! a fixed worklist of identifiers.
//!
//! Progress is confirmed two ways. A write observer calls
//! [`RecordGate::mark_written`] when it sees the per-identifier artifact
//! being written, and every query re-checks storage for the pending
//! artifact. The storage check is the ground truth; the observer is only a
//! shortcut, so the gate stays correct when the signal never arrives.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use stagegate_artifacts::{ArtifactIndex, RecordLayout, normalize_path};

use crate::recovery::Recovery;

/// Why an identifier query was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    #[error("validation queue not initialized: load the matched companies before querying")]
    NotInitialized,

    #[error(
        "one identifier at a time: requested '{requested}'. Split into separate calls, one identifier each"
    )]
    MultipleIdentifiers { requested: String },

    #[error(
        "cannot query {requested}: must write pending identifier {pending} first. \
         Write {path} before querying anything else, and do not re-query {pending}"
    )]
    PendingWrite {
        pending: String,
        requested: String,
        path: String,
    },

    #[error("all {total} identifiers already processed; move on to consolidation")]
    Exhausted { total: usize },

    #[error(
        "wrong order: expected {expected} (position {position}/{total}), requested {requested}. \
         Identifiers must be processed in worklist order"
    )]
    OutOfOrder {
        expected: String,
        requested: String,
        position: usize,
        total: usize,
    },

    #[error("pagination is not allowed for this stage (skip must be 0, got {skip}); fetch everything in one call")]
    Pagination { skip: u64 },
}

/// An accepted identifier query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub identifier: String,
    /// 1-based position in the worklist.
    pub position: usize,
    pub total: usize,
    /// Where the caller must write this identifier's artifact.
    pub artifact_path: String,
}

/// Progress tracker over an ordered worklist of identifiers.
#[derive(Debug, Clone)]
pub struct RecordGate {
    layout: RecordLayout,
    worklist: Vec<String>,
    cursor_index: usize,
    pending: Option<String>,
    initialized: bool,
    reconciled: bool,
}

impl RecordGate {
    pub fn new(layout: RecordLayout) -> Self {
        Self {
            layout,
            worklist: Vec::new(),
            cursor_index: 0,
            pending: None,
            initialized: false,
            reconciled: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn worklist(&self) -> &[String] {
        &self.worklist
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor_index
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn remaining(&self) -> usize {
        self.worklist.len().saturating_sub(self.cursor_index)
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Fix the worklist and reconcile against storage.
    ///
    /// One-shot: returns `None` (and changes nothing) if already initialized.
    pub fn initialize<I: ArtifactIndex + ?Sized>(
        &mut self,
        index: &I,
        worklist: Vec<String>,
    ) -> Option<Recovery> {
        if self.initialized {
            debug!("record gate already initialized; ignoring");
            return None;
        }

        self.worklist = worklist;
        self.initialized = true;
        let outcome = self.reconcile(index);
        info!(
            total = self.worklist.len(),
            remaining = self.remaining(),
            "record gate initialized"
        );
        Some(outcome)
    }

    /// Move the cursor to the first worklist entry without a stored artifact
    /// and clear any pending identifier.
    ///
    /// Never moves the cursor backward. On a failed scan nothing changes.
    pub fn reconcile<I: ArtifactIndex + ?Sized>(&mut self, index: &I) -> Recovery {
        if !self.initialized {
            return Recovery::Fresh;
        }

        let keys = match index.list_keys(&self.layout.pattern()) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(
                    pattern = %self.layout.pattern(),
                    error = %e,
                    "record reconciliation scan failed; keeping current position"
                );
                return Recovery::Degraded(e.to_string());
            }
        };

        let written: HashSet<&str> = keys
            .iter()
            .filter_map(|key| self.layout.parse_identifier(key))
            .collect();

        let first_missing = self
            .worklist
            .iter()
            .position(|id| !written.contains(id.as_str()))
            .unwrap_or(self.worklist.len());

        let previous = self.cursor_index;
        self.cursor_index = previous.max(first_missing);
        self.pending = None;
        self.reconciled = true;

        if written.is_empty() {
            return Recovery::Fresh;
        }

        info!(
            written = written.len(),
            from = previous,
            cursor_index = self.cursor_index,
            total = self.worklist.len(),
            "reconciled record gate"
        );
        Recovery::Restored {
            artifacts: written.len(),
        }
    }

    /// Check an identifier query against the gate and, when accepted, make
    /// that identifier the pending one.
    pub fn validate_and_advance<I: ArtifactIndex + ?Sized>(
        &mut self,
        index: &I,
        identifiers: &str,
        page_offset: u64,
    ) -> Result<Admission, GateRejection> {
        let result = self.check(index, identifiers, page_offset);
        if let Err(rejection) = &result {
            warn!(identifiers, page_offset, %rejection, "identifier query rejected");
        }
        result
    }

    fn check<I: ArtifactIndex + ?Sized>(
        &mut self,
        index: &I,
        identifiers: &str,
        page_offset: u64,
    ) -> Result<Admission, GateRejection> {
        if !self.initialized {
            return Err(GateRejection::NotInitialized);
        }

        let requested: Vec<&str> = identifiers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let [identifier] = requested.as_slice() else {
            return Err(GateRejection::MultipleIdentifiers {
                requested: identifiers.to_string(),
            });
        };
        let identifier = *identifier;

        if let Some(pending) = self.pending.clone() {
            let path = self.layout.key(&pending);
            let written = match index.contains(&path) {
                Ok(found) => found,
                Err(e) => {
                    warn!(path, error = %e, "pending artifact lookup failed");
                    false
                }
            };

            if !written {
                return Err(GateRejection::PendingWrite {
                    pending,
                    requested: identifier.to_string(),
                    path,
                });
            }

            debug!(identifier = %pending, "pending artifact found in storage");
            self.mark_written(&pending);
        }

        if let Err(rejection) = self.check_position(identifier) {
            if self.reconciled {
                return Err(rejection);
            }
            self.reconcile(index);
            self.check_position(identifier)?;
        }

        if page_offset != 0 {
            return Err(GateRejection::Pagination { skip: page_offset });
        }

        self.pending = Some(identifier.to_string());
        info!(
            identifier,
            position = self.cursor_index + 1,
            total = self.worklist.len(),
            "identifier query accepted"
        );
        Ok(Admission {
            identifier: identifier.to_string(),
            position: self.cursor_index + 1,
            total: self.worklist.len(),
            artifact_path: self.layout.key(identifier),
        })
    }

    fn check_position(&self, identifier: &str) -> Result<(), GateRejection> {
        let total = self.worklist.len();
        let Some(expected) = self.worklist.get(self.cursor_index) else {
            return Err(GateRejection::Exhausted { total });
        };
        if expected != identifier {
            return Err(GateRejection::OutOfOrder {
                expected: expected.clone(),
                requested: identifier.to_string(),
                position: self.cursor_index + 1,
                total,
            });
        }
        Ok(())
    }

    /// Confirm the pending identifier's artifact was written and advance.
    ///
    /// No-op unless `identifier` is the pending one. Returns whether the
    /// cursor moved.
    pub fn mark_written(&mut self, identifier: &str) -> bool {
        if self.pending.as_deref() != Some(identifier) {
            return false;
        }
        self.pending = None;
        self.cursor_index += 1;
        info!(
            identifier,
            cursor_index = self.cursor_index,
            remaining = self.remaining(),
            "identifier artifact confirmed"
        );
        true
    }

    /// Write observer hook: feed every written path through here.
    pub fn observe_write(&mut self, path: &str) -> bool {
        let path = normalize_path(path);
        let Some(identifier) = self.layout.parse_identifier(path) else {
            return false;
        };
        let identifier = identifier.to_string();
        self.mark_written(&identifier)
    }

    /// Drop the pending identifier without advancing, used when its query
    /// failed before returning anything. Returns whether it was pending.
    pub fn release(&mut self, identifier: &str) -> bool {
        if self.pending.as_deref() != Some(identifier) {
            return false;
        }
        self.pending = None;
        debug!(identifier, "pending identifier released");
        true
    }
}
