use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

pub type Document = serde_json::Value;

/// Maps the current document (if any) to its replacement. Returning an error aborts the update.
/// Stores may call it more than once when they retry a conflicting write.
pub type UpdateFn<'a> = &'a (dyn Fn(Option<&Document>) -> Result<Document> + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upserted,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub key: String,
    pub kind: ChangeKind,
    pub document: Option<Document>,
}

/// Per-collection document store with a truly atomic per-key update.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>>;

    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()>;

    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    async fn atomic_update(
        &self,
        collection: &str,
        key: &str,
        update: UpdateFn<'_>,
    ) -> Result<Document>;

    fn subscribe(&self, collection: &str) -> BoxStream<'static, ChangeEvent>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
