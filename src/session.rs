use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::ChangeEvent;
use crate::payload;
use crate::store::{DocumentStore, MongoStore};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ids generated by [`Session::insert_document_dual`].
#[derive(Debug, Clone, PartialEq)]
pub struct DualInsert {
    pub audit_id: Bson,
    pub inserted_id: Bson,
}

/// How a watch came to an end without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WatchEnd {
    /// The server closed the change stream.
    Exhausted { forwarded: u64 },
    /// Nobody is listening anymore.
    ReceiverClosed { forwarded: u64 },
    Cancelled,
}

/// An open database client with a bound database.
///
/// Clones share the same client and its connection pool.
pub struct Session<S = MongoStore> {
    store: Arc<S>,
    audit_collection: Arc<str>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit_collection: Arc::clone(&self.audit_collection),
        }
    }
}

impl Session<MongoStore> {
    /// Connect, ping and bind the configured database, all within
    /// `config.connect_timeout`.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let limit = config.connect_timeout;
        let session = Self::open(
            limit,
            config.audit_collection.clone(),
            MongoStore::connect(&config.uri, &config.database, limit),
        )
        .await?;

        tracing::info!("Connected to MongoDB! database={}", config.database);
        Ok(session)
    }
}

impl<S: DocumentStore> Session<S> {
    pub fn new(store: S, audit_collection: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            audit_collection: Arc::from(audit_collection.into()),
        }
    }

    /// Build a session from `connect`, giving up after `limit`.
    pub async fn open<F>(
        limit: Duration,
        audit_collection: impl Into<String>,
        connect: F,
    ) -> Result<Self>
    where
        F: Future<Output = Result<S>>,
    {
        match tokio::time::timeout(limit, connect).await {
            Ok(store) => Ok(Self::new(store?, audit_collection)),
            Err(_) => {
                tracing::error!("cannot connect to DB, timed out after {:?}", limit);
                Err(SessionError::Timeout(limit))
            }
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit_collection(&self) -> &str {
        &self.audit_collection
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await.map_err(|e| {
            tracing::warn!("ping failed: {}", e);
            SessionError::Ping(e)
        })
    }

    /// Decode an extended JSON payload and insert it into `collection`.
    ///
    /// Nothing is written when the payload does not decode.
    pub async fn insert_document(&self, collection: &str, payload: &str) -> Result<Bson> {
        let document = payload::parse_document(payload).map_err(|e| {
            tracing::error!("error while decoding payload for {}: {}", collection, e);
            e
        })?;
        tracing::debug!("decoded document: {}", document);

        self.insert(collection, document).await
    }

    /// Insert `payload` into the audit collection, then into `collection`.
    ///
    /// A failed audit write skips the second write. A failed second write
    /// leaves the audit copy in place.
    pub async fn insert_document_dual<T>(&self, collection: &str, payload: &T) -> Result<DualInsert>
    where
        T: Serialize + ?Sized,
    {
        let document = bson::to_document(payload).map_err(|e| {
            tracing::error!("could not encode payload for {}: {}", collection, e);
            SessionError::Encode(e)
        })?;

        let audit_id = self.insert(&self.audit_collection, document.clone()).await?;
        let inserted_id = self.insert(collection, document).await?;

        Ok(DualInsert {
            audit_id,
            inserted_id,
        })
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<Bson> {
        match self.store.insert_one(collection, document).await {
            Ok(id) => {
                tracing::info!("Successfully inserted to {} collection. Document ID: {}", collection, id);
                Ok(id)
            }
            Err(e) => {
                tracing::error!("could not insert one to {}: {}", collection, e);
                Err(SessionError::Write {
                    collection: collection.to_string(),
                    source: e,
                })
            }
        }
    }

    /// First document in `collection` matching `filter`.
    pub async fn find_one(&self, collection: &str, filter: Document) -> Result<Document> {
        let found = self
            .store
            .find_one(collection, filter)
            .await
            .map_err(|e| {
                tracing::error!("find in {} failed: {}", collection, e);
                SessionError::Read {
                    collection: collection.to_string(),
                    source: e,
                }
            })?;

        match found {
            Some(document) => {
                tracing::debug!("found in {}: {}", collection, document);
                Ok(document)
            }
            None => {
                tracing::debug!("no document in {} matched", collection);
                Err(SessionError::NoDocuments(collection.to_string()))
            }
        }
    }

    /// [`find_one`](Self::find_one) with an extended JSON filter.
    pub async fn find_one_json(&self, collection: &str, filter: &str) -> Result<Document> {
        let filter = payload::parse_document(filter)?;
        self.find_one(collection, filter).await
    }

    pub async fn find_one_as<T>(&self, collection: &str, filter: Document) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let document = self.find_one(collection, filter).await?;
        bson::from_document(document).map_err(SessionError::Deserialize)
    }

    /// Forward every insert on `collection` to `events` until the change
    /// stream ends, fails, or the receiver goes away.
    ///
    /// Sends wait for channel capacity, so a slow consumer slows the watch
    /// down instead of buffering without bound.
    pub async fn watch_collection(
        &self,
        collection: &str,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<WatchEnd> {
        let mut stream = self
            .store
            .watch(collection, insert_only())
            .await
            .map_err(|e| {
                tracing::error!("could not open change stream on {}: {}", collection, e);
                SessionError::WatchOpen {
                    collection: collection.to_string(),
                    source: e,
                }
            })?;
        tracing::info!("watching {} for inserts", collection);

        let mut forwarded = 0;
        while let Some(next) = stream.next().await {
            let event = next.map_err(|e| {
                tracing::error!("change stream on {} failed: {}", collection, e);
                SessionError::Watch {
                    collection: collection.to_string(),
                    source: e,
                }
            })?;

            if !event.is_insert() {
                tracing::debug!(
                    "skipping {:?} event on {}",
                    event.operation_type(),
                    collection
                );
                continue;
            }

            if events.send(event).await.is_err() {
                tracing::info!("receiver for {} dropped after {} events", collection, forwarded);
                return Ok(WatchEnd::ReceiverClosed { forwarded });
            }
            forwarded += 1;
        }

        tracing::info!("change stream on {} ended after {} events", collection, forwarded);
        Ok(WatchEnd::Exhausted { forwarded })
    }

    /// Shut the client down. Waits for outstanding cursors, live watches
    /// included, to be dropped first.
    pub async fn close(self) -> Result<()> {
        self.store.shutdown().await.map_err(|e| {
            tracing::error!("error while closing DB client: {}", e);
            SessionError::Shutdown(e)
        })?;
        tracing::info!("DB client closed");
        Ok(())
    }
}

fn insert_only() -> Vec<Document> {
    vec![doc! { "$match": { "operationType": "insert" } }]
}
