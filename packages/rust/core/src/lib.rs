//! Core state machines and stage drivers for stagegate.
//!
//! - [`BatchCursor`] keeps a paginated source walk sequential and resumable.
//! - [`RecordGate`] enforces one-at-a-time, write-before-advance processing
//!   of a worklist.
//! - [`consolidate`] and [`merge`] fold stage artifacts into aggregates.
//! - [`stage`] exposes all of it as the tool surface a driving agent calls.
//!
//! Neither state machine persists anything itself; both rebuild their
//! position from the artifact store on first use.

pub mod consolidate;
pub mod cursor;
pub mod gate;
pub mod import;
pub mod merge;
pub mod recovery;
pub mod sources;
pub mod stage;
pub mod status;

pub use cursor::{BatchCursor, CursorRejection};
pub use gate::{Admission, GateRejection, RecordGate};
pub use recovery::Recovery;
pub use sources::{CompanySource, LibsqlSources, PressReleaseSource};
pub use stage::{MatchingStage, RankingStage, ValidationStage};
pub use status::{RunStatus, Stage, run_status};
