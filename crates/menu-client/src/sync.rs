//! Remote menu documents kept in step with the backend.
//!
//! The backend is the source of truth. Local copies are only ever replaced
//! by a complete fetch, never merged: a push invalidation triggers a fresh
//! load, and a save is followed by a reload. Unsaved local edits are lost
//! when an invalidation arrives.

use crate::api::ApiClient;
use crate::channel::PushChannel;
use crate::coalesce::Coalescer;
use crate::error::{ClientError, ClientResult};
use crate::media::MediaProbe;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use menu_proto::{FieldError, ItemPayload, MenuDocument, PushMessage, RestaurantId, RestaurantPayload};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where documents come from and go to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, restaurant_id: &str) -> ClientResult<MenuDocument>;

    /// Persists `document` as the complete desired state.
    async fn store(&self, restaurant_id: &str, document: &MenuDocument) -> ClientResult<()>;
}

/// [`DocumentStore`] backed by the REST API.
pub struct HttpDocumentStore {
    api: ApiClient,
}

impl HttpDocumentStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn fetch(&self, restaurant_id: &str) -> ClientResult<MenuDocument> {
        let raw = self.api.menu(restaurant_id).await?;
        Ok(raw.validate(restaurant_id)?)
    }

    /// Writes the configuration, then reconciles items against what the
    /// backend holds right now: new items are created, changed ones updated
    /// and the ones missing locally deleted.
    async fn store(&self, restaurant_id: &str, document: &MenuDocument) -> ClientResult<()> {
        self.api
            .update_restaurant(restaurant_id, &RestaurantPayload::from(document))
            .await?;

        let remote = self.api.menu(restaurant_id).await?;
        let mut remote_items: HashMap<String, Option<ItemPayload>> = HashMap::new();
        for (i, raw) in remote.items.iter().enumerate() {
            let Some(id) = raw.id.as_ref().and_then(menu_proto::restaurant_id_of) else {
                continue;
            };
            let current = raw
                .validate(&format!("items[{i}]"), None)
                .ok()
                .map(|item| ItemPayload::from(&item));
            remote_items.insert(id, current);
        }

        let (mut created, mut updated, mut deleted) = (0usize, 0usize, 0usize);
        for item in document.items() {
            let payload = ItemPayload::from(item);
            match item.id.as_deref().and_then(|id| remote_items.remove(id).map(|r| (id, r))) {
                Some((_, Some(current))) if current == payload => {}
                Some((id, _)) => {
                    self.api.update_item(restaurant_id, id, &payload).await?;
                    updated += 1;
                }
                None => {
                    self.api.create_item(restaurant_id, &payload).await?;
                    created += 1;
                }
            }
        }
        for id in remote_items.keys() {
            self.api.delete_item(restaurant_id, id).await?;
            deleted += 1;
        }

        info!(restaurant_id, created, updated, deleted, "Menu stored");
        Ok(())
    }
}

/// Read-only view of one document slot.
#[derive(Debug, Clone, Default)]
pub struct DocumentSnapshot {
    /// Last successfully loaded copy; kept when a later load fails.
    pub document: Option<Arc<MenuDocument>>,
    /// Set when the most recent load failed, cleared by the next success.
    pub last_error: Option<ClientError>,
    pub loaded_at: Option<DateTime<Utc>>,
}

pub type InvalidationCallback = Arc<dyn Fn(&str, &DocumentSnapshot) + Send + Sync>;

#[derive(Default)]
struct Slot {
    snapshot: DocumentSnapshot,
    /// Sequence number of the load that produced `snapshot`.
    seq: u64,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    media: Option<Arc<MediaProbe>>,
    slots: DashMap<RestaurantId, Slot>,
    loads: Coalescer<RestaurantId, Arc<MenuDocument>>,
    subscribers: DashMap<u64, (RestaurantId, InvalidationCallback)>,
    next_subscriber: AtomicU64,
    next_seq: AtomicU64,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, media: Option<Arc<MediaProbe>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                media,
                slots: DashMap::new(),
                loads: Coalescer::new(),
                subscribers: DashMap::new(),
                next_subscriber: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fetches the full document, replacing the local copy. Concurrent calls
    /// for one id share a single request.
    pub async fn load(&self, restaurant_id: &str) -> ClientResult<Arc<MenuDocument>> {
        self.ensure_open()?;
        load_shared(Arc::clone(&self.inner), restaurant_id.to_string()).await
    }

    /// Sends `document` as the desired state. Local state is untouched either
    /// way; call [`Self::load`] (or use [`Self::save_and_reload`]) to see the
    /// result.
    pub async fn save(&self, restaurant_id: &str, document: &MenuDocument) -> ClientResult<()> {
        self.ensure_open()?;
        if document.restaurant_id != restaurant_id {
            return Err(ClientError::ValidationFailed {
                fields: vec![FieldError::new(
                    "restaurant_id",
                    format!(
                        "document belongs to {}, not {restaurant_id}",
                        document.restaurant_id
                    ),
                )],
            });
        }

        info!(restaurant_id, items = document.item_count(), "Saving menu");
        if let Err(e) = self.inner.store.store(restaurant_id, document).await {
            warn!(restaurant_id, error = %e, "Save failed");
            return Err(e);
        }
        // A load started before the save may still be in flight; it must
        // not satisfy loads issued from now on.
        self.inner.loads.forget(&restaurant_id.to_string());
        Ok(())
    }

    pub async fn save_and_reload(
        &self,
        restaurant_id: &str,
        document: &MenuDocument,
    ) -> ClientResult<Arc<MenuDocument>> {
        self.save(restaurant_id, document).await?;
        self.load(restaurant_id).await
    }

    /// Registers `callback` to run after every reload caused by a remote
    /// change of `restaurant_id`. Dropping the returned [`Subscription`]
    /// unregisters it.
    pub fn on_invalidate<F>(&self, restaurant_id: &str, callback: F) -> Subscription
    where
        F: Fn(&str, &DocumentSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner
                .subscribers
                .insert(id, (restaurant_id.to_string(), Arc::new(callback)));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn snapshot(&self, restaurant_id: &str) -> DocumentSnapshot {
        self.inner
            .slots
            .get(restaurant_id)
            .map(|slot| slot.snapshot.clone())
            .unwrap_or_default()
    }

    /// Reloads subscribed documents whenever `channel` reports a change.
    pub fn attach(&self, channel: &PushChannel) {
        self.attach_receiver(channel.subscribe());
    }

    pub fn attach_receiver(&self, mut events: broadcast::Receiver<PushMessage>) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let message = match events.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed push messages, reloading every subscribed menu");
                        PushMessage::MenuChanged {
                            restaurant_id: None,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                for id in inner.watched(&message) {
                    tokio::spawn(reload_and_notify(Arc::clone(&inner), id));
                }
            }
            debug!("Push listener stopped");
        });
        self.inner.tasks.lock().push(task);
    }

    /// Stops listening and revokes every callback. Loads settling after this
    /// leave state untouched.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.subscribers.clear();
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Synchronizer shut down");
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Config("synchronizer has been shut down".into()));
        }
        Ok(())
    }
}

/// Revocable registration returned by [`Synchronizer::on_invalidate`].
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.remove(&self.id);
        }
    }
}

impl Inner {
    fn watched(&self, message: &PushMessage) -> BTreeSet<RestaurantId> {
        self.subscribers
            .iter()
            .map(|entry| entry.value().0.clone())
            .filter(|id| message.invalidates(id))
            .collect()
    }

    fn callbacks_for(&self, restaurant_id: &str) -> Vec<InvalidationCallback> {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().0 == restaurant_id)
            .map(|entry| Arc::clone(&entry.value().1))
            .collect()
    }

    fn commit(&self, restaurant_id: &str, seq: u64, outcome: Result<Arc<MenuDocument>, ClientError>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut slot = self.slots.entry(restaurant_id.to_string()).or_default();
        if seq < slot.seq {
            debug!(restaurant_id, seq, current = slot.seq, "Discarding superseded load");
            return;
        }
        slot.seq = seq;
        match outcome {
            Ok(document) => {
                slot.snapshot.document = Some(document);
                slot.snapshot.last_error = None;
                slot.snapshot.loaded_at = Some(Utc::now());
            }
            Err(e) => slot.snapshot.last_error = Some(e),
        }
    }
}

async fn load_shared(inner: Arc<Inner>, restaurant_id: RestaurantId) -> ClientResult<Arc<MenuDocument>> {
    let worker = Arc::clone(&inner);
    let key = restaurant_id.clone();
    inner
        .loads
        .run(key, move || fetch(worker, restaurant_id))
        .await
}

async fn fetch(inner: Arc<Inner>, restaurant_id: RestaurantId) -> ClientResult<Arc<MenuDocument>> {
    let seq = inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(%restaurant_id, seq, "Loading menu");

    let result = inner.store.fetch(&restaurant_id).await.map(Arc::new);
    match &result {
        Ok(document) => {
            inner.commit(&restaurant_id, seq, Ok(Arc::clone(document)));
            // Probes only warm the media cache; the load never waits on them.
            if let Some(media) = inner.media.clone() {
                let document = Arc::clone(document);
                let restaurant_id = restaurant_id.clone();
                tokio::spawn(async move {
                    let statuses = media.probe_document(&document).await;
                    debug!(%restaurant_id, probed = statuses.len(), "Media probed");
                });
            }
        }
        Err(e) => {
            warn!(%restaurant_id, error = %e, "Load failed, keeping previous copy");
            inner.commit(&restaurant_id, seq, Err(e.clone()));
        }
    }
    result
}

async fn reload_and_notify(inner: Arc<Inner>, restaurant_id: RestaurantId) {
    info!(%restaurant_id, "Remote change, reloading");
    // A load already in flight may have left before the change; join a fresh one.
    inner.loads.forget(&restaurant_id);
    // Failures are recorded on the slot; subscribers read them from the snapshot.
    let _ = load_shared(Arc::clone(&inner), restaurant_id.clone()).await;

    if inner.closed.load(Ordering::SeqCst) {
        return;
    }
    let snapshot = inner
        .slots
        .get(&restaurant_id)
        .map(|slot| slot.snapshot.clone())
        .unwrap_or_default();
    for callback in inner.callbacks_for(&restaurant_id) {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        callback(&restaurant_id, &snapshot);
    }
}
