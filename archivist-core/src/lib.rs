//! # Archivist Core
//!
//! Keeps an image library, the image files on disk and their metadata
//! sidecars in agreement.
//!
//! ## Overview
//!
//! Records live in a [`store::LibraryStore`]; files live in vaults, one
//! internal vault plus any number of linked folders. Every mutation goes
//! through [`library::LibraryService`], which writes the store and then asks
//! the [`sync::DiskSyncEngine`] to bring the disk in line: materialise
//! in-memory images, move files between vaults, rename files after their
//! title and rewrite sidecars and embedded tags.
//!
//! In the other direction, [`watcher::VaultWatcher`] imports files that
//! show up in a vault from outside, while [`event_gate::EventGate`] keeps the
//! engine's own writes from echoing back as imports.
//!
//! ## Architecture
//!
//! - [`provider`]: capability-scoped filesystem access behind an allow-list
//! - [`store`]: persistence port with in-memory and JSON snapshot backends
//! - [`sync`]: the disk sync engine, its per-record locks and the sync log
//! - [`history`]: undo and redo on top of the engine
//! - [`import`]: batch import with duplicate detection
//! - [`watcher`]: live watching and the startup reconcile pass
//! - [`maintenance`]: hash backfill and metadata enrichment loops
//! - [`context`]: wiring for a running archive
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use archivist_core::config::RuntimeConfig;
//! use archivist_core::context::ArchiveContext;
//! use archivist_core::import::{DuplicateChoice, FixedChoice};
//!
//! # async fn run() -> archivist_core::error::Result<()> {
//! let ctx = ArchiveContext::build(
//!     RuntimeConfig::default(),
//!     Arc::new(FixedChoice(DuplicateChoice::Skip)),
//! )
//! .await?;
//! ctx.start().await?;
//! let summary = ctx.pass.run(true).await?;
//! println!("imported {} files", summary.imported);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Validated runtime tuning consumed by the services
pub mod config;

/// Service wiring and background task lifecycle
pub mod context;

/// Dimensions and generation tags stored inside image files
pub mod embedded;

/// Error types and error handling utilities
pub mod error;

/// Self-write suppression and duplicate watch event filtering
pub mod event_gate;

/// Content hashing
pub mod hashing;

/// Undo and redo
pub mod history;

/// Batch import with duplicate detection
pub mod import;

/// Caller-facing library operations
pub mod library;

/// Background hash backfill and metadata enrichment
pub mod maintenance;

/// Filesystem providers and the allow-list
pub mod provider;

/// Sidecar files next to images
pub mod sidecar;

/// Record persistence
pub mod store;

/// The disk sync engine
pub mod sync;

/// User-visible notifications
pub mod toast;

/// Locators, vault roots and file naming
pub mod vault;

/// Filesystem watching and reconciliation
pub mod watcher;

pub use error::{ArchiveError, Result};
