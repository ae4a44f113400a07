//! Suppression of watcher feedback.
//!
//! Two mechanisms share this gate. The ignore list holds paths the engine is
//! about to write itself; entries expire after a TTL because watch backends
//! report with latency. The fingerprint cache remembers the last `(size,
//! mtime)` seen per path so a backend that reports the same write twice is
//! only heard once.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::trace;

use crate::config::GateConfig;
use crate::provider::FsEvent;
use crate::vault::{clean_path, path_key, sidecar_paths};

/// What the gate decided about a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    /// The engine caused this change.
    SelfWrite,
    /// Same path, size and mtime as an event seen within the TTL.
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
struct Fingerprint {
    size: u64,
    modified: Option<SystemTime>,
    seen_at: Instant,
}

#[derive(Debug)]
pub struct EventGate {
    ignored: DashMap<String, Instant>,
    seen: DashMap<String, Fingerprint>,
    config: GateConfig,
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

fn key(path: &Path) -> String {
    path_key(&clean_path(path))
}

impl EventGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            ignored: DashMap::new(),
            seen: DashMap::new(),
            config,
        }
    }

    /// Suppress events for `path` until `ttl` has passed.
    pub fn ignore(&self, path: &Path, ttl: Duration) {
        let until = Instant::now() + ttl;
        self.ignored
            .entry(key(path))
            .and_modify(|existing| {
                if *existing < until {
                    *existing = until;
                }
            })
            .or_insert(until);
    }

    /// Suppress `path` plus its `.json`/`.txt` sidecars.
    pub fn ignore_with_sidecars(&self, path: &Path, ttl: Duration) {
        self.ignore(path, ttl);
        for sidecar in sidecar_paths(path) {
            self.ignore(&sidecar, ttl);
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let key = key(path);
        match self.ignored.get(&key).map(|until| *until) {
            Some(until) if until > Instant::now() => true,
            Some(_) => {
                self.ignored.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Classify an event and remember its fingerprint.
    pub fn admit(&self, event: &FsEvent) -> GateDecision {
        let key = key(&event.path);
        let now = Instant::now();
        let size = event.size.unwrap_or(0);

        let duplicate = self.seen.get(&key).is_some_and(|cached| {
            now.duration_since(cached.seen_at) <= self.config.fingerprint_ttl
                && cached.size == size
                && cached.modified == event.modified
        });
        self.seen.insert(
            key,
            Fingerprint {
                size,
                modified: event.modified,
                seen_at: now,
            },
        );

        if self.is_ignored(&event.path) {
            GateDecision::SelfWrite
        } else if duplicate {
            GateDecision::Duplicate
        } else {
            GateDecision::Admit
        }
    }

    /// Drop expired ignore entries and fingerprints.
    pub fn sweep(&self) {
        let now = Instant::now();
        let ttl = self.config.fingerprint_ttl;
        self.ignored.retain(|_, until| *until > now);
        self.seen
            .retain(|_, print| now.duration_since(print.seen_at) <= ttl);
        trace!(
            ignored = self.ignored.len(),
            fingerprints = self.seen.len(),
            "event gate swept"
        );
    }

    /// Periodic [`EventGate::sweep`] for the lifetime of the returned task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        let period = gate.config.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                gate.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ignore_entries_expire() {
        let gate = EventGate::default();
        let path = Path::new("/Vault/Cat.png");
        gate.ignore_with_sidecars(path, Duration::from_millis(2000));

        assert!(gate.is_ignored(Path::new("/vault/cat.png")));
        assert!(gate.is_ignored(Path::new("/vault/cat.json")));

        tokio::time::advance(Duration::from_millis(2001)).await;
        assert!(!gate.is_ignored(path));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_fingerprints_are_duplicates_within_ttl() {
        let gate = EventGate::default();
        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(100);
        let event = FsEvent::added(PathBuf::from("/vault/a.png")).with_fingerprint(10, Some(mtime));

        assert_eq!(gate.admit(&event), GateDecision::Admit);
        assert_eq!(gate.admit(&event), GateDecision::Duplicate);

        let changed = event.clone().with_fingerprint(11, Some(mtime));
        assert_eq!(gate.admit(&changed), GateDecision::Admit);

        tokio::time::advance(Duration::from_millis(5001)).await;
        assert_eq!(gate.admit(&changed), GateDecision::Admit);
    }

    #[tokio::test(start_paused = true)]
    async fn self_writes_win_over_fingerprints() {
        let gate = EventGate::default();
        gate.ignore(Path::new("/vault/a.png"), Duration::from_secs(3));
        let event = FsEvent::added(PathBuf::from("/vault/a.png"));
        assert_eq!(gate.admit(&event), GateDecision::SelfWrite);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_forgets_stale_state() {
        let gate = EventGate::default();
        gate.ignore(Path::new("/vault/a.png"), Duration::from_secs(2));
        gate.admit(&FsEvent::added(PathBuf::from("/vault/b.png")));

        tokio::time::advance(Duration::from_secs(6)).await;
        gate.sweep();
        assert!(gate.ignored.is_empty());
        assert!(gate.seen.is_empty());
    }
}
