//! Outcome of rebuilding in-memory progress from stored artifacts.

use std::fmt;

/// Result of a recovery or reconciliation scan.
///
/// Scans never fail the caller: a storage error becomes [`Recovery::Degraded`]
/// and the state machine carries on from whatever position it already had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// No matching artifacts exist yet.
    Fresh,
    /// Position rebuilt from `artifacts` stored artifacts.
    Restored { artifacts: usize },
    /// The scan could not complete; state was left unchanged.
    Degraded(String),
}

impl Recovery {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Restored { artifacts } => write!(f, "restored from {artifacts} artifacts"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
        }
    }
}
