//! `notify` bridge for [`LocalFsProvider`](super::LocalFsProvider).
//!
//! Raw notifications are reduced to "this path changed". A path is only
//! reported once it has been quiet for the settle window, and its event kind
//! is decided by whether it exists at that moment. A file that is still being
//! copied in therefore produces a single `Added` once the writer is done.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, warn};

use super::{FsEvent, WatchSubscription};
use crate::error::{ArchiveError, Result};

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Keeps the notify watcher alive and stops the settle loop on drop.
struct WatchGuard {
    _watcher: RecommendedWatcher,
    settle_task: JoinHandle<()>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.settle_task.abort();
    }
}

/// Watch `watched` (the resolved directory) and report paths under `root`,
/// the directory as the caller named it.
pub(super) async fn watch_directory(
    root: PathBuf,
    watched: PathBuf,
    settle: Duration,
    capacity: usize,
) -> Result<WatchSubscription> {
    let capacity = capacity.max(16);
    let (raw_tx, raw_rx) = mpsc::channel::<WatchMessage>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<FsEvent>(capacity);

    let watch_root = watched.clone();
    let watcher = spawn_blocking(move || init_watcher(&watch_root, raw_tx))
        .await
        .map_err(|err| ArchiveError::Internal(format!("watcher initialization panicked: {err}")))??;

    let settle_task = spawn_settle_loop(root.clone(), watched, raw_rx, event_tx, settle);

    Ok(WatchSubscription::new(
        root,
        event_rx,
        Some(Box::new(WatchGuard {
            _watcher: watcher,
            settle_task,
        })),
    ))
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let path_for_log = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                    warn!(
                        "watch channel send failed for {}: {}",
                        path_for_log.display(),
                        err
                    );
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        ArchiveError::Internal(format!(
            "failed to create watcher for {}: {}",
            root.display(),
            err
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|err| {
            ArchiveError::Internal(format!("failed to watch {}: {}", root.display(), err))
        })?;

    Ok(watcher)
}

fn spawn_settle_loop(
    root: PathBuf,
    watched: PathBuf,
    mut rx: mpsc::Receiver<WatchMessage>,
    tx: mpsc::Sender<FsEvent>,
    settle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            let msg = if pending.is_empty() {
                rx.recv().await
            } else {
                match timeout(settle, rx.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        if flush_settled(&mut pending, settle, &tx).await.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            };

            let Some(msg) = msg else {
                let _ = flush_settled(&mut pending, Duration::ZERO, &tx).await;
                break;
            };

            match msg {
                WatchMessage::Event(event) => {
                    for path in touched_paths(&watched, &root, &event) {
                        pending.insert(path, Instant::now());
                    }
                }
                WatchMessage::Error(error) => {
                    warn!(root = %root.display(), "watcher error: {error}");
                }
            }

            // Under sustained churn the timeout above never fires.
            if flush_settled(&mut pending, settle, &tx).await.is_err() {
                break;
            }
        }
        debug!(root = %root.display(), "settle loop stopped");
    })
}

/// Paths directly inside the watched directory that an event touched,
/// rebased onto `root` so a symlinked vault reports the paths it was
/// configured with.
fn touched_paths(watched: &Path, root: &Path, event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        _ => event
            .paths
            .iter()
            .filter(|path| !is_hidden(path))
            .filter_map(|path| {
                let parent = path.parent()?;
                if parent != watched && parent != root {
                    return None;
                }
                Some(root.join(path.file_name()?))
            })
            .collect(),
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Deliver every path that has been quiet for `settle`. Errors only when
/// the subscriber has gone away.
async fn flush_settled(
    pending: &mut HashMap<PathBuf, Instant>,
    settle: Duration,
    tx: &mpsc::Sender<FsEvent>,
) -> std::result::Result<(), ()> {
    let now = Instant::now();
    let mut ready: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, touched)| now.duration_since(**touched) >= settle)
        .map(|(path, _)| path.clone())
        .collect();
    ready.sort();

    for path in ready {
        pending.remove(&path);
        let event = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                FsEvent::added(path).with_fingerprint(meta.len(), meta.modified().ok())
            }
            Ok(_) => continue,
            Err(_) => FsEvent::removed(path),
        };
        tx.send(event).await.map_err(|_| ())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, MetadataKind};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn only_direct_children_are_touched() {
        let root = Path::new("/vault");
        let create = event(
            EventKind::Create(CreateKind::File),
            &["/vault/cat.png", "/vault/nested/dog.png", "/vault/.cat.png.tmp.1"],
        );
        assert_eq!(
            touched_paths(root, root, &create),
            vec![PathBuf::from("/vault/cat.png")]
        );
    }

    #[test]
    fn metadata_and_access_events_are_ignored() {
        let root = Path::new("/vault");
        let chmod = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/vault/cat.png"],
        );
        assert!(touched_paths(root, root, &chmod).is_empty());

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/vault/cat.png"],
        );
        assert_eq!(touched_paths(root, root, &write).len(), 1);
    }

    #[test]
    fn resolved_paths_are_reported_under_the_configured_root() {
        let create = event(
            EventKind::Create(CreateKind::File),
            &["/private/var/vault/cat.png", "/private/var/other/dog.png"],
        );
        assert_eq!(
            touched_paths(Path::new("/private/var/vault"), Path::new("/var/vault"), &create),
            vec![PathBuf::from("/var/vault/cat.png")]
        );
    }
}
