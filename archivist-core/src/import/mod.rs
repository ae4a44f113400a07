//! Batch import with duplicate detection.
//!
//! Nothing from a batch is persisted until every candidate has been hashed
//! and, when duplicates turned up, a [`DuplicateResolver`] has decided what
//! to do with them.

pub mod candidate;
pub mod importer;

pub use candidate::{ImportCandidate, mime_for_extension};
pub use importer::{
    DuplicateChoice, DuplicateResolver, FixedChoice, ImportBatch, ImportReport, Importer,
};
