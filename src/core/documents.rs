use crate::domain::ports::{ChangeEvent, Document, DocumentStore};
use crate::utils::error::{LunchError, Result};
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub fn decode<T: DeserializeOwned>(collection: &str, key: &str, document: Document) -> Result<T> {
    serde_json::from_value(document).map_err(|source| LunchError::MalformedDocument {
        collection: collection.to_string(),
        key: key.to_string(),
        source,
    })
}

pub fn encode<T: Serialize>(value: &T) -> Result<Document> {
    Ok(serde_json::to_value(value)?)
}

/// Typed access to a [`DocumentStore`]. Every call is bounded by `timeout` and
/// every document is validated on the way out of the store.
pub struct Documents<S: DocumentStore> {
    store: S,
    timeout: Duration,
}

impl<S: DocumentStore> Documents<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Store {} timed out after {:?}", operation, self.timeout);
                Err(LunchError::persistence(
                    operation,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        }
    }

    pub async fn load<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>> {
        let document = self.bounded("get", self.store.get(collection, key)).await?;
        document.map(|d| decode(collection, key, d)).transpose()
    }

    pub async fn load_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let documents = self.bounded("list", self.store.list(collection)).await?;
        documents
            .into_iter()
            .map(|(key, d)| decode(collection, &key, d))
            .collect()
    }

    pub async fn remove(&self, collection: &str, key: &str) -> Result<()> {
        self.bounded("delete", self.store.delete(collection, key))
            .await
    }

    /// Atomic typed read-modify-write of one document.
    pub async fn update<T>(
        &self,
        collection: &str,
        key: &str,
        apply: &(dyn Fn(Option<T>) -> Result<T> + Send + Sync),
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let raw = |current: Option<&Document>| -> Result<Document> {
            let current = current
                .map(|d| decode::<T>(collection, key, d.clone()))
                .transpose()?;
            encode(&apply(current)?)
        };
        let committed = self
            .bounded("atomic_update", self.store.atomic_update(collection, key, &raw))
            .await?;
        decode(collection, key, committed)
    }

    pub fn subscribe(&self, collection: &str) -> BoxStream<'static, ChangeEvent> {
        self.store.subscribe(collection)
    }
}
