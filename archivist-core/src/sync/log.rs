use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use archivist_model::ImageId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    Ok,
    Error,
    Skipped,
}

impl SyncResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncResult::Ok => "ok",
            SyncResult::Error => "error",
            SyncResult::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One step of a disk sync, as recorded in the [`SyncLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub at: DateTime<Utc>,
    pub op: &'static str,
    pub id: ImageId,
    pub path: Option<PathBuf>,
    pub result: SyncResult,
    pub reason: Option<String>,
    pub duration: Duration,
}

impl SyncLogEntry {
    pub fn new(op: &'static str, id: &ImageId, result: SyncResult) -> Self {
        Self {
            at: Utc::now(),
            op,
            id: id.clone(),
            path: None,
            result,
            reason: None,
            duration: Duration::ZERO,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

impl fmt::Display for SyncLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<14} {:<8} {} ({} ms)",
            self.at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.op,
            self.result,
            self.id,
            self.duration.as_millis()
        )?;
        if let Some(path) = &self.path {
            write!(f, " {}", path.display())?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " - {reason}")?;
        }
        Ok(())
    }
}

/// Bounded in-memory history of sync steps. Each entry is also emitted on
/// the `archivist::sync` tracing target.
pub struct SyncLog {
    entries: Mutex<VecDeque<SyncLogEntry>>,
    capacity: usize,
}

impl fmt::Debug for SyncLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLog")
            .field("len", &self.entries.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SyncLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, entry: SyncLogEntry) {
        let path = entry
            .path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let reason = entry.reason.as_deref().unwrap_or_default();
        let duration_ms = entry.duration.as_millis() as u64;
        match entry.result {
            SyncResult::Ok => info!(
                target: "archivist::sync",
                op = entry.op,
                id = %entry.id,
                path = %path,
                duration_ms,
                "sync step ok"
            ),
            SyncResult::Skipped => debug!(
                target: "archivist::sync",
                op = entry.op,
                id = %entry.id,
                path = %path,
                reason = %reason,
                "sync step skipped"
            ),
            SyncResult::Error => warn!(
                target: "archivist::sync",
                op = entry.op,
                id = %entry.id,
                path = %path,
                reason = %reason,
                duration_ms,
                "sync step failed"
            ),
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn entries_for(&self, id: &ImageId) -> Vec<SyncLogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| &entry.id == id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_fall_off() {
        let log = SyncLog::new(2);
        let ids: Vec<ImageId> = (0..3).map(|_| ImageId::new()).collect();
        for id in &ids {
            log.record(SyncLogEntry::new("rename", id, SyncResult::Ok));
        }
        let kept: Vec<ImageId> = log.entries().into_iter().map(|entry| entry.id).collect();
        assert_eq!(kept, ids[1..].to_vec());
    }

    #[test]
    fn display_includes_reason() {
        let id = ImageId::from_string("x1").unwrap();
        let line = SyncLogEntry::new("vault_move", &id, SyncResult::Error)
            .with_path("/vault/cat.png")
            .with_reason("copy failed")
            .to_string();
        assert!(line.contains("vault_move"));
        assert!(line.contains("error"));
        assert!(line.ends_with("/vault/cat.png - copy failed"));
    }
}
