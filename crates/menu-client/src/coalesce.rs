//! In-flight request de-duplication.
//!
//! The first caller for a key starts the work on its own task; later callers
//! for the same key await the same shared result. The entry is removed as
//! soon as the work settles, success or failure, so the next call after that
//! starts fresh. The map therefore only ever holds in-flight keys.

use crate::error::{ClientError, ClientResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedResult<V> = Shared<BoxFuture<'static, ClientResult<V>>>;

pub struct Coalescer<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    in_flight: Arc<DashMap<K, (u64, SharedResult<V>)>>,
    next_generation: AtomicU64,
}

impl<K, V> Coalescer<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Runs `start()` unless a request for `key` is already in flight, in
    /// which case its outcome is shared.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> ClientResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<V>> + Send + 'static,
    {
        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(?key, "Joining in-flight request");
                entry.get().1.clone()
            }
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let map = Arc::clone(&self.in_flight);
                let work = start();

                let handle = tokio::spawn(async move {
                    let outcome = work.await;
                    map.remove_if(&key, |_, (g, _)| *g == generation);
                    outcome
                });
                let shared = async move {
                    handle
                        .await
                        .unwrap_or_else(|e| Err(ClientError::Network(format!("request task: {e}"))))
                }
                .boxed()
                .shared();

                entry.insert((generation, shared.clone()));
                shared
            }
        };
        shared.await
    }

    /// Detaches the in-flight request for `key`; the next `run` starts a new
    /// one while current waiters still get the old outcome.
    pub fn forget(&self, key: &K) {
        self.in_flight.remove(key);
    }
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
