use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::trace;

use crate::library::RefreshSink;

/// Coalesces bursts of watch activity into a single library refresh.
///
/// Each [`poke`](RefreshDebouncer::poke) restarts the quiet period; the
/// refresh fires once nothing has arrived for that long.
pub struct RefreshDebouncer {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl fmt::Debug for RefreshDebouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshDebouncer")
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

impl RefreshDebouncer {
    pub fn spawn(sink: Arc<dyn RefreshSink>, quiet: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let mut burst = 1usize;
                loop {
                    match timeout(quiet, rx.recv()).await {
                        Ok(Some(())) => burst += 1,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                trace!(events = burst, "watch burst settled");
                sink.request_refresh().await;
            }
        });
        Self { tx, task }
    }

    pub fn poke(&self) {
        let _ = self.tx.send(());
    }
}

impl Drop for RefreshDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl RefreshSink for CountingSink {
        async fn request_refresh(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_triggers_one_refresh_after_quiet_period() {
        let sink = Arc::new(CountingSink::default());
        let debouncer = RefreshDebouncer::spawn(sink.clone(), Duration::from_secs(2));

        for _ in 0..5 {
            debouncer.poke();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);

        debouncer.poke();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }
}
