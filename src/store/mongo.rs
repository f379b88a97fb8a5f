use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::{
    Client, Database,
    bson::{Bson, Document, RawDocumentBuf, doc},
    options::ClientOptions,
};

use super::{DocumentStore, EventStream};
use crate::error::{SessionError, StoreError};
use crate::event::ChangeEvent;

/// [`DocumentStore`] over a MongoDB client and one bound database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Create a client for `uri`, ping it, and bind `db_name`.
    ///
    /// `timeout` becomes the driver's connect and server selection timeout,
    /// so an unreachable server fails the ping instead of hanging.
    pub async fn connect(uri: &str, db_name: &str, timeout: Duration) -> Result<Self, SessionError> {
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("cannot make connection to DB: {}", e);
            SessionError::Connect(e.into())
        })?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(|e| {
            tracing::error!("cannot make connection to DB: {}", e);
            SessionError::Connect(e.into())
        })?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                tracing::error!("cannot connect to DB, ping failed: {}", e);
                SessionError::Ping(e.into())
            })?;

        let database = client.database(db_name);
        Ok(Self { client, database })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson, StoreError> {
        let result = self
            .database
            .collection::<Document>(collection)
            .insert_one(document)
            .await?;

        Ok(result.inserted_id)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        let found = self
            .database
            .collection::<Document>(collection)
            .find_one(filter)
            .await?;

        Ok(found)
    }

    async fn watch(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<EventStream, StoreError> {
        let stream = self
            .database
            .collection::<Document>(collection)
            .watch()
            .pipeline(pipeline)
            .await?
            .with_type::<RawDocumentBuf>();

        Ok(stream
            .map(|next| next.map(ChangeEvent::from_raw).map_err(StoreError::from))
            .boxed())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
