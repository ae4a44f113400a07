//! Background maintenance: hash backfill and metadata enrichment.
//!
//! Both loops work in small batches and sleep between them so a large
//! library never ties up the runtime for long.

pub mod colors;
pub mod enrich;
pub mod hashes;
pub mod metadata;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use colors::{FALLBACK_COLOR, dominant_colors, dominant_colors_or_fallback};
pub use enrich::{Enrichment, enrich_record};
pub use hashes::HashBackfill;
pub use metadata::MetadataEnrichment;

use crate::config::MaintenanceConfig;
use crate::library::RefreshSink;

/// What one `run_batch` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub updated: usize,
    /// Candidates left for later batches.
    pub remaining: usize,
}

impl BatchOutcome {
    pub fn has_more(&self) -> bool {
        self.remaining > 0
    }
}

/// Running maintenance loops. Dropping the handle stops them.
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for MaintenanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintenanceHandle")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl MaintenanceHandle {
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the hash backfill and enrichment loops.
///
/// The hash loop comes back quickly while work remains and idles otherwise.
/// Enrichment runs on a fixed interval. Either loop asks for a library
/// refresh after a batch that changed records.
pub fn spawn_maintenance(
    hashes: Arc<HashBackfill>,
    metadata: Arc<MetadataEnrichment>,
    refresh: Arc<dyn RefreshSink>,
    config: MaintenanceConfig,
) -> MaintenanceHandle {
    let hash_task = {
        let refresh = Arc::clone(&refresh);
        let config = config.clone();
        tokio::spawn(async move {
            tokio::time::sleep(config.initial_delay).await;
            loop {
                let delay = match hashes.run_batch().await {
                    Ok(outcome) => {
                        if outcome.updated > 0 {
                            refresh.request_refresh().await;
                        }
                        if outcome.has_more() {
                            config.hash_busy_delay
                        } else {
                            config.hash_idle_delay
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "hash backfill batch failed");
                        config.hash_idle_delay
                    }
                };
                tokio::time::sleep(delay).await;
            }
        })
    };

    let metadata_task = tokio::spawn(async move {
        tokio::time::sleep(config.initial_delay).await;
        loop {
            match metadata.run_batch().await {
                Ok(outcome) if outcome.updated > 0 => {
                    info!(updated = outcome.updated, remaining = outcome.remaining, "metadata enrichment batch");
                    refresh.request_refresh().await;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "metadata enrichment batch failed"),
            }
            tokio::time::sleep(config.metadata_interval).await;
        }
    });

    MaintenanceHandle {
        tasks: vec![hash_task, metadata_task],
    }
}
