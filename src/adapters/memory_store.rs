use crate::domain::ports::{ChangeEvent, ChangeKind, Document, DocumentStore, UpdateFn};
use crate::utils::error::{LunchError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

const EVENT_BUFFER: usize = 256;

type Collections = HashMap<String, BTreeMap<String, Document>>;

struct Inner {
    collections: Mutex<Collections>,
    events: broadcast::Sender<ChangeEvent>,
    latency_ms: AtomicU64,
    unavailable: AtomicBool,
}

/// Process-local document store. Every write happens under one lock, so
/// `atomic_update` is linearizable per key.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                collections: Mutex::new(HashMap::new()),
                events,
                latency_ms: AtomicU64::new(0),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Delay every call, for exercising caller timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every call fail with a persistence error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LunchError::persistence(operation, "store unavailable"));
        }
        Ok(())
    }

    fn publish(&self, collection: &str, key: &str, kind: ChangeKind, document: Option<Document>) {
        // No subscribers is fine.
        let _ = self.inner.events.send(ChangeEvent {
            collection: collection.to_string(),
            key: key.to_string(),
            kind,
            document,
        });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.enter("get").await?;
        let collections = self.inner.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        self.enter("list").await?;
        let collections = self.inner.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, doc)| (key.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        self.enter("put").await?;
        let mut collections = self.inner.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document.clone());
        self.publish(collection, key, ChangeKind::Upserted, Some(document));
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.enter("delete").await?;
        let mut collections = self.inner.collections.lock().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(key));
        if removed.is_some() {
            self.publish(collection, key, ChangeKind::Deleted, None);
        }
        Ok(())
    }

    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        update: UpdateFn<'_>,
    ) -> Result<Document> {
        self.enter("atomic_update").await?;
        let mut collections = self.inner.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(key);
        let next = update(current)?;
        if current != Some(&next) {
            docs.insert(key.to_string(), next.clone());
            self.publish(collection, key, ChangeKind::Upserted, Some(next.clone()));
        }
        Ok(next)
    }

    fn subscribe(&self, collection: &str) -> BoxStream<'static, ChangeEvent> {
        let receiver = self.inner.events.subscribe();
        let collection = collection.to_string();
        stream::unfold(receiver, move |mut receiver| {
            let collection = collection.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) if event.collection == collection => {
                            return Some((event, receiver))
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Change feed for {} lagged by {} events", collection, skipped);
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        assert!(store.get("items", "a").await.unwrap().is_none());

        store.put("items", "a", json!({"n": 1})).await.unwrap();
        assert_eq!(store.get("items", "a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(store.list("items").await.unwrap().len(), 1);

        store.delete("items", "a").await.unwrap();
        assert!(store.get("items", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_atomic_update_error_leaves_document_untouched() {
        let store = InMemoryStore::new();
        store.put("votes", "d", json!({"v": 1})).await.unwrap();

        let result = store
            .atomic_update("votes", "d", &|_| Err(LunchError::NoEligibleItems))
            .await;
        assert!(result.is_err());
        assert_eq!(store.get("votes", "d").await.unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_atomic_increments_are_not_lost() {
        let store = InMemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .atomic_update("counters", "c", &|doc| {
                        let n = doc.and_then(|d| d.as_u64()).unwrap_or(0);
                        Ok(json!(n + 1))
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("counters", "c").await.unwrap(), Some(json!(50)));
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_collection() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe("votes");

        store.put("history", "h", json!(1)).await.unwrap();
        store.put("votes", "v", json!(2)).await.unwrap();

        let event = feed.next().await.unwrap();
        assert_eq!(event.collection, "votes");
        assert_eq!(event.key, "v");
        assert_eq!(event.kind, ChangeKind::Upserted);
    }

    #[tokio::test]
    async fn test_feed_stays_pending_for_other_collections_and_noops() {
        use tokio_test::{assert_pending, assert_ready, task};

        let store = InMemoryStore::new();
        store.put("votes", "v", json!(1)).await.unwrap();
        let mut feed = task::spawn(store.subscribe("votes"));
        assert_pending!(feed.poll_next());

        store.put("history", "h", json!(1)).await.unwrap();
        store
            .atomic_update("votes", "v", &|doc| Ok(doc.cloned().unwrap_or_default()))
            .await
            .unwrap();
        assert_pending!(feed.poll_next());

        store.delete("votes", "v").await.unwrap();
        assert!(feed.is_woken());
        let event = assert_ready!(feed.poll_next()).unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.document.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_persistence_error() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let err = store.get("items", "a").await.unwrap_err();
        assert!(matches!(err, LunchError::Persistence { .. }));
    }
}
