use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

/// Events observers can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// An operation committed its store mutations.
    Changed,
    QueryChanged(String),
}

/// Side-channel progress reporting. Must not affect the operation itself.
pub trait ProgressSink: Send + Sync {
    fn start(&self, label: &str, category: &str);
    fn finish(&self, label: &str, category: &str);
}

/// Reports progress as tracing events.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn start(&self, label: &str, category: &str) {
        tracing::debug!(label, category, "progress started");
    }

    fn finish(&self, label: &str, category: &str) {
        tracing::debug!(label, category, "progress finished");
    }
}

/// Result of a tracked operation.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Store mutations were committed; observers get one change event.
    Committed(T),
    /// Failed, superseded or nothing to commit.
    Skipped(T),
}

struct ProgressGuard<'a> {
    sink: &'a dyn ProgressSink,
    label: &'a str,
    category: &'a str,
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.sink.finish(self.label, self.category);
    }
}

pub struct Notifier {
    events: broadcast::Sender<CatalogEvent>,
    progress: Arc<dyn ProgressSink>,
}

impl Notifier {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { events, progress }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: CatalogEvent) {
        let _ = self.events.send(event);
    }

    /// Shows progress while `operation` runs and emits [`CatalogEvent::Changed`]
    /// once it completes with [`Outcome::Committed`].
    pub async fn track<T, F>(&self, label: &str, category: &str, operation: F) -> T
    where
        F: Future<Output = Outcome<T>>,
    {
        let outcome = {
            self.progress.start(label, category);
            let _guard = ProgressGuard {
                sink: self.progress.as_ref(),
                label,
                category,
            };
            operation.await
        };

        match outcome {
            Outcome::Committed(value) => {
                self.emit(CatalogEvent::Changed);
                value
            }
            Outcome::Skipped(value) => value,
        }
    }
}
