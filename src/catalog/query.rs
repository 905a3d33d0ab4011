use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

/// Cancellation handle scoping one search cycle.
///
/// Cancellation is advisory: holders check it before committing.
#[derive(Debug, Clone, Default)]
pub struct EpochToken {
    cancelled: Arc<AtomicBool>,
}

impl EpochToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Waits for `window` of quiet after each query change and hands the latest
/// value to `on_quiet`. Returns once the sender side is dropped or `on_quiet`
/// returns `false`.
pub async fn debounce_queries<F>(mut queries: watch::Receiver<String>, window: Duration, mut on_quiet: F)
where
    F: FnMut(String) -> bool,
{
    loop {
        if queries.changed().await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                changed = queries.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(window) => break,
            }
        }

        let query = queries.borrow_and_update().clone();
        if !on_quiet(query) {
            return;
        }
    }
}
