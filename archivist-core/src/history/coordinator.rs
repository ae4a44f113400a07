use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use archivist_model::{DeletedImage, HistoryAction, HistoryEntry, ImagePatch, PatchedImage};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::sync::{DiskDeletion, DiskSyncEngine};
use crate::toast::Toast;

/// What an undo or redo call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    /// The action with this label was applied.
    Applied(&'static str),
    /// Nothing to undo or redo.
    Empty,
    /// Another undo or redo is still running.
    Busy,
}

#[derive(Debug, Default)]
struct Stacks {
    past: Vec<HistoryEntry>,
    future: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Undo/redo stacks for library mutations.
///
/// Undoing an update writes the revert patch and reconciles the disk
/// against the pre-undo record, so a reverted title renames the file back.
/// Undoing a delete restores the backup when there is one and re-adds the
/// row either way. Only one undo or redo runs at a time.
pub struct HistoryCoordinator {
    engine: Arc<DiskSyncEngine>,
    stacks: Mutex<Stacks>,
    in_flight: AtomicBool,
}

impl fmt::Debug for HistoryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.stacks.lock();
        f.debug_struct("HistoryCoordinator")
            .field("past", &stacks.past.len())
            .field("future", &stacks.future.len())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl HistoryCoordinator {
    pub fn new(engine: Arc<DiskSyncEngine>) -> Self {
        Self {
            engine,
            stacks: Mutex::new(Stacks::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Record a new action. Anything that could have been redone is dropped.
    pub fn push(&self, action: HistoryAction) {
        let mut stacks = self.stacks.lock();
        stacks.past.push(HistoryEntry::now(action));
        stacks.future.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.stacks.lock().past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.stacks.lock().future.is_empty()
    }

    /// Past actions, oldest first.
    pub fn past(&self) -> Vec<HistoryEntry> {
        self.stacks.lock().past.clone()
    }

    /// Undone actions, next redo last.
    pub fn future(&self) -> Vec<HistoryEntry> {
        self.stacks.lock().future.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn undo(&self) -> Result<HistoryStep> {
        self.step(Direction::Undo).await
    }

    pub async fn redo(&self) -> Result<HistoryStep> {
        self.step(Direction::Redo).await
    }

    async fn step(&self, direction: Direction) -> Result<HistoryStep> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(HistoryStep::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let popped = {
            let mut stacks = self.stacks.lock();
            match direction {
                Direction::Undo => stacks.past.pop(),
                Direction::Redo => stacks.future.pop(),
            }
        };
        let Some(mut entry) = popped else {
            return Ok(HistoryStep::Empty);
        };
        let label = entry.action.label();

        let applied = match direction {
            Direction::Undo => self.revert(&entry.action).await,
            Direction::Redo => self.replay(&mut entry.action).await,
        };

        let mut stacks = self.stacks.lock();
        match (applied, direction) {
            (Ok(()), Direction::Undo) => {
                stacks.future.push(entry);
                drop(stacks);
                info!(action = label, "undo applied");
                self.engine.notifier().notify(Toast::info("Undo successful"));
                Ok(HistoryStep::Applied(label))
            }
            (Ok(()), Direction::Redo) => {
                stacks.past.push(entry);
                drop(stacks);
                info!(action = label, "redo applied");
                self.engine.notifier().notify(Toast::info("Redo successful"));
                Ok(HistoryStep::Applied(label))
            }
            (Err(err), direction) => {
                match direction {
                    Direction::Undo => stacks.past.push(entry),
                    Direction::Redo => stacks.future.push(entry),
                }
                drop(stacks);
                warn!(action = label, error = %err, "history step failed");
                let verb = match direction {
                    Direction::Undo => "Undo",
                    Direction::Redo => "Redo",
                };
                self.engine
                    .notifier()
                    .notify(Toast::error(format!("{verb} failed: {err}")));
                Err(err)
            }
        }
    }

    async fn revert(&self, action: &HistoryAction) -> Result<()> {
        match action {
            HistoryAction::Update(item) => self.apply_patch(item, &item.revert).await,
            HistoryAction::BatchUpdate(items) => {
                for item in items.iter().rev() {
                    self.apply_patch(item, &item.revert).await?;
                }
                Ok(())
            }
            HistoryAction::Delete(deleted) => self.restore(deleted).await,
            HistoryAction::BatchDelete(deleted) => {
                for item in deleted {
                    self.restore(item).await?;
                }
                Ok(())
            }
        }
    }

    async fn replay(&self, action: &mut HistoryAction) -> Result<()> {
        match action {
            HistoryAction::Update(item) => self.apply_patch(item, &item.changes).await,
            HistoryAction::BatchUpdate(items) => {
                for item in items.iter() {
                    self.apply_patch(item, &item.changes).await?;
                }
                Ok(())
            }
            HistoryAction::Delete(deleted) => self.delete_again(deleted).await,
            HistoryAction::BatchDelete(deleted) => {
                for item in deleted.iter_mut() {
                    self.delete_again(item).await?;
                }
                Ok(())
            }
        }
    }

    async fn apply_patch(&self, item: &PatchedImage, patch: &ImagePatch) -> Result<()> {
        let store = self.engine.store();
        let Some(before) = store.get_image(&item.id).await? else {
            warn!(id = %item.id, "history target no longer exists");
            return Ok(());
        };
        store.update_image(&item.id, patch).await?;
        self.engine.reconcile(&item.id, &before).await;
        Ok(())
    }

    async fn restore(&self, deleted: &DeletedImage) -> Result<()> {
        let mut record = deleted.record.clone();
        if let Some(backup) = &deleted.backup {
            match self.engine.restore_backup(&record, backup).await {
                Ok(restored) => record = restored,
                Err(err) => {
                    warn!(id = %record.id, error = %err, "backup restore failed; restoring the row only");
                }
            }
        }
        self.engine.store().put_image(record).await
    }

    async fn delete_again(&self, deleted: &mut DeletedImage) -> Result<()> {
        let store = self.engine.store();
        let Some(current) = store.get_image(&deleted.record.id).await? else {
            return Ok(());
        };
        let disk = self.engine.delete_from_disk(&current, false).await?;
        if let DiskDeletion::Trashed(backup) = disk {
            deleted.backup = backup;
        }
        deleted.record = current;
        store.delete_image(&deleted.record.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use archivist_model::ImageRecord;

    use super::*;
    use crate::config::EngineConfig;
    use crate::event_gate::EventGate;
    use crate::provider::InMemoryProvider;
    use crate::store::{InMemoryStore, LibraryStore};
    use crate::toast::RecordingNotifier;

    fn coordinator() -> (HistoryCoordinator, Arc<InMemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = DiskSyncEngine::new(
            Arc::new(InMemoryProvider::with_vault("/vault")),
            store.clone(),
            Arc::new(EventGate::default()),
            notifier.clone(),
            EngineConfig::default(),
        );
        (HistoryCoordinator::new(Arc::new(engine)), store, notifier)
    }

    fn rating_change(record: &ImageRecord, rating: u8) -> HistoryAction {
        let changes = ImagePatch {
            rating: Some(rating),
            ..ImagePatch::default()
        };
        HistoryAction::Update(PatchedImage {
            id: record.id.clone(),
            revert: changes.inverse(record),
            changes,
        })
    }

    #[tokio::test]
    async fn undo_and_redo_move_between_stacks() {
        let (history, store, notifier) = coordinator();
        let record = ImageRecord::new("cat");
        store.put_image(record.clone()).await.unwrap();

        let action = rating_change(&record, 5);
        store
            .update_image(&record.id, &ImagePatch { rating: Some(5), ..ImagePatch::default() })
            .await
            .unwrap();
        history.push(action);

        assert_eq!(history.undo().await.unwrap(), HistoryStep::Applied("update"));
        assert_eq!(store.get_image(&record.id).await.unwrap().unwrap().rating, 0);
        assert!(history.can_redo());

        assert_eq!(history.redo().await.unwrap(), HistoryStep::Applied("update"));
        assert_eq!(store.get_image(&record.id).await.unwrap().unwrap().rating, 5);
        assert!(!history.can_redo());

        let messages: Vec<String> = notifier.toasts().into_iter().map(|t| t.message).collect();
        assert_eq!(messages, vec!["Undo successful", "Redo successful"]);
    }

    #[tokio::test]
    async fn push_clears_the_future() {
        let (history, store, _) = coordinator();
        let record = ImageRecord::new("cat");
        store.put_image(record.clone()).await.unwrap();

        history.push(rating_change(&record, 2));
        history.undo().await.unwrap();
        assert!(history.can_redo());

        history.push(rating_change(&record, 3));
        assert!(!history.can_redo());
        assert_eq!(history.past().len(), 1);
    }

    #[tokio::test]
    async fn empty_stacks_do_nothing() {
        let (history, _, notifier) = coordinator();
        assert_eq!(history.undo().await.unwrap(), HistoryStep::Empty);
        assert_eq!(history.redo().await.unwrap(), HistoryStep::Empty);
        assert!(notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn deleted_rows_come_back_without_a_backup() {
        let (history, store, _) = coordinator();
        let record = ImageRecord::new("memory only");
        history.push(HistoryAction::Delete(DeletedImage {
            record: record.clone(),
            backup: None,
        }));

        history.undo().await.unwrap();
        assert!(store.get_image(&record.id).await.unwrap().is_some());

        history.redo().await.unwrap();
        assert!(store.get_image(&record.id).await.unwrap().is_none());
    }
}
