//! Undo and redo of library mutations.

pub mod coordinator;

pub use coordinator::{HistoryCoordinator, HistoryStep};
