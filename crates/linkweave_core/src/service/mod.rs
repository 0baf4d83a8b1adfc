//! Engine facade and change coordination.
//!
//! # Responsibility
//! - Expose the note lifecycle, link queries and daily notes to hosts.
//! - Funnel every graph mutation through one drain sequence.
//! - Notify subscribers about note and link changes.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;

pub use coordinator::{DrainReport, LinkState, PendingNote};
pub use engine::{DailyAgenda, GraphStats, NoteGraph};
pub use error::{EngineError, EngineResult};
pub use events::{ChangeEvent, ChangeKind};
