//! Batch Cursor: sequential offset enforcement over a paginated source.
//!
//! The cursor only tracks where the driving agent *should* be. Where it
//! actually is lives in the batch artifacts, so a fresh process rebuilds the
//! cursor by scanning `<dir>/batch_*.json` before judging its first request.

use tracing::{debug, info, warn};

use stagegate_artifacts::{ArtifactIndex, BatchLayout};
use stagegate_shared::{Result, StageGateError};

use crate::recovery::Recovery;

/// Why a batch request was refused. No state changes on rejection, so the
/// caller can simply retry with the right offset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorRejection {
    #[error(
        "all batches already processed (has_more=false was returned); consolidate the batch files next"
    )]
    Complete,

    #[error(
        "sequential batch violation: expected offset {expected}, requested offset {requested}. \
         Batches must be processed sequentially; the next valid offset is {expected}"
    )]
    OutOfOrder { expected: u64, requested: u64 },

    #[error(
        "batch size violation: limit {requested} does not match the batch size {batch_size}. \
         Every batch must request exactly {batch_size} rows"
    )]
    PageSize { batch_size: u64, requested: u64 },
}

/// First multiple of `batch_size` strictly after `max_offset`, or `None`
/// when it does not fit in a `u64`.
pub fn next_batch_offset(max_offset: u64, batch_size: u64) -> Option<u64> {
    (max_offset / batch_size)
        .checked_add(1)?
        .checked_mul(batch_size)
}

/// Tracks the next expected offset into an ordered paginated dataset.
#[derive(Debug, Clone)]
pub struct BatchCursor {
    layout: BatchLayout,
    batch_size: u64,
    expected_offset: u64,
    completed: bool,
    recovery: Option<Recovery>,
}

impl BatchCursor {
    /// Create a cursor at offset 0. `batch_size` must be positive.
    pub fn new(layout: BatchLayout, batch_size: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(StageGateError::validation("batch_size must be greater than 0"));
        }
        Ok(Self {
            layout,
            batch_size,
            expected_offset: 0,
            completed: false,
            recovery: None,
        })
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn expected_offset(&self) -> u64 {
        self.expected_offset
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    /// Rebuild the expected offset from stored batch artifacts.
    ///
    /// Runs at most once per cursor; later calls return the first outcome.
    pub fn recover<I: ArtifactIndex + ?Sized>(&mut self, index: &I) -> Recovery {
        if let Some(done) = &self.recovery {
            return done.clone();
        }

        let outcome = match index.list_keys(&self.layout.pattern()) {
            Ok(keys) => self.restore_from(&keys),
            Err(e) => {
                warn!(
                    pattern = %self.layout.pattern(),
                    error = %e,
                    "batch recovery scan failed; starting at offset 0"
                );
                Recovery::Degraded(e.to_string())
            }
        };

        self.recovery = Some(outcome.clone());
        outcome
    }

    fn restore_from(&mut self, keys: &[String]) -> Recovery {
        let offsets: Vec<u64> = keys
            .iter()
            .filter_map(|key| {
                let parsed = self.layout.parse_offset(key);
                if parsed.is_none() {
                    debug!(key, "ignoring unrecognized batch artifact");
                }
                parsed
            })
            .collect();

        let Some(max_offset) = offsets.iter().copied().max() else {
            return Recovery::Fresh;
        };

        if max_offset % self.batch_size != 0 {
            warn!(
                max_offset,
                batch_size = self.batch_size,
                "highest batch offset is not aligned to the batch size"
            );
        }

        let Some(next) = next_batch_offset(max_offset, self.batch_size) else {
            warn!(
                max_offset,
                batch_size = self.batch_size,
                "highest batch offset leaves no room for another batch; starting at offset 0"
            );
            return Recovery::Degraded(format!(
                "batch offset {max_offset} has no representable successor"
            ));
        };
        self.expected_offset = next;
        info!(
            max_offset,
            expected_offset = self.expected_offset,
            batches = offsets.len(),
            "recovered batch cursor"
        );
        Recovery::Restored {
            artifacts: offsets.len(),
        }
    }

    /// Accept `requested` if it is exactly the next expected offset.
    ///
    /// On acceptance the cursor advances immediately, before the caller's
    /// query runs. Returns the accepted offset.
    pub fn validate_and_advance<I: ArtifactIndex + ?Sized>(
        &mut self,
        index: &I,
        requested: u64,
    ) -> std::result::Result<u64, CursorRejection> {
        self.recover(index);

        if self.completed {
            warn!(requested, "batch rejected: source already exhausted");
            return Err(CursorRejection::Complete);
        }

        if requested != self.expected_offset {
            warn!(
                requested,
                expected = self.expected_offset,
                "batch rejected: out of order"
            );
            return Err(CursorRejection::OutOfOrder {
                expected: self.expected_offset,
                requested,
            });
        }

        self.expected_offset = self.expected_offset.saturating_add(self.batch_size);
        info!(offset = requested, next = self.expected_offset, "batch accepted");
        Ok(requested)
    }

    /// Every batch spans exactly `batch_size` rows; any other page size would
    /// skip or repeat rows once the cursor advances.
    pub fn check_page_size(&self, limit: u64) -> std::result::Result<(), CursorRejection> {
        if limit != self.batch_size {
            warn!(limit, batch_size = self.batch_size, "batch rejected: page size mismatch");
            return Err(CursorRejection::PageSize {
                batch_size: self.batch_size,
                requested: limit,
            });
        }
        Ok(())
    }

    /// Record that the source reported no further records. Irreversible.
    pub fn mark_complete(&mut self) {
        if !self.completed {
            info!(expected_offset = self.expected_offset, "batch source exhausted");
        }
        self.completed = true;
    }

    /// Undo the acceptance of `offset` when the query it gated never ran to
    /// completion, so the same batch can be requested again.
    ///
    /// Only the most recently accepted offset can be released, and never
    /// after completion. Returns whether the cursor moved.
    pub fn release(&mut self, offset: u64) -> bool {
        if self.completed || offset.checked_add(self.batch_size) != Some(self.expected_offset) {
            return false;
        }
        self.expected_offset = offset;
        debug!(offset, "batch acceptance released");
        true
    }
}
