//! In-flight call coalescing keyed by normalized request key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error};

use crate::FeedError;

type SharedCall<T> = Shared<BoxFuture<'static, Result<T, FeedError>>>;
type PendingMap<T> = Arc<Mutex<HashMap<String, PendingCall<T>>>>;

struct PendingCall<T: Clone> {
    id: u64,
    call: SharedCall<T>,
}

/// Guarantees at most one concurrent upstream call per key.
///
/// The first caller for a key spawns the call as its own task; later callers await
/// the same shared result, success or failure. The task deregisters itself when it
/// settles (including on panic), so a failed call never leaves a stuck entry and
/// a cancelled caller never cancels the call for everyone else.
pub struct RequestDeduplicator<T: Clone> {
    pending: PendingMap<T>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: &str, factory: F) -> Result<T, FeedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FeedError>> + Send + 'static,
    {
        let call = {
            let mut pending = self.pending.lock().expect("dedup lock is not poisoned");
            match pending.get(key) {
                Some(existing) => {
                    debug!(key, "joining in-flight call");
                    existing.call.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let call = self.spawn(key, id, factory());
                    pending.insert(
                        key.to_owned(),
                        PendingCall {
                            id,
                            call: call.clone(),
                        },
                    );
                    call
                }
            }
        };

        call.await
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.pending
            .lock()
            .expect("dedup lock is not poisoned")
            .contains_key(key)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().expect("dedup lock is not poisoned").len()
    }

    fn spawn<Fut>(&self, key: &str, id: u64, future: Fut) -> SharedCall<T>
    where
        Fut: Future<Output = Result<T, FeedError>> + Send + 'static,
    {
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key: key.to_owned(),
            id,
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            future.await
        });

        let owned_key = key.to_owned();
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(key = %owned_key, error = %join_error, "deduplicated call aborted");
                    Err(FeedError::internal(format!(
                        "deduplicated call for '{owned_key}' aborted: {join_error}"
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Removes the pending entry when the spawned call settles or unwinds.
struct PendingGuard<T: Clone> {
    pending: PendingMap<T>,
    key: String,
    id: u64,
}

impl<T: Clone> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        // A newer call may already own the key; only remove our own registration.
        if pending.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            pending.remove(&self.key);
        }
    }
}
