mod mongo;

pub use mongo::MongoStore;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use mongodb::bson::{Bson, Document};

use crate::error::StoreError;
use crate::event::ChangeEvent;

pub type EventStream = BoxStream<'static, Result<ChangeEvent, StoreError>>;

/// The handful of database calls a [`Session`](crate::Session) makes.
///
/// Everything behind this trait is the driver's job; implementations pass
/// documents through without looking at them.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Liveness check against the server.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert one document and return its `_id`.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Open a change stream on `collection` with the given aggregation stages.
    async fn watch(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<EventStream, StoreError>;

    /// Release the underlying connections.
    async fn shutdown(&self) -> Result<(), StoreError>;
}
