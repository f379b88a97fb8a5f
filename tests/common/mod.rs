#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};

use mongoconnect::{ChangeEvent, DocumentStore, EventStream, Session, StoreError};

pub const AUDIT: &str = "audit";

/// In-memory store that records calls and fails on demand.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    collections: HashMap<String, Vec<Document>>,
    insert_calls: HashMap<String, usize>,
    failing_inserts: HashSet<String>,
    events: HashMap<String, Vec<Result<ChangeEvent, String>>>,
    watch_pipelines: Vec<Vec<Document>>,
    endless: HashSet<String>,
    stream_dropped: Arc<AtomicBool>,
    unreachable: bool,
    shut_down: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts_into(self, collection: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_inserts
            .insert(collection.to_string());
        self
    }

    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    pub fn with_document(self, collection: &str, document: Document) -> Self {
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        self
    }

    /// Queue a change event of `operation` on `collection`.
    pub fn with_event(self, collection: &str, operation: &str, full_document: Document) -> Self {
        let event = ChangeEvent::from_document(&doc! {
            "_id": { "_data": ObjectId::new().to_hex() },
            "operationType": operation,
            "ns": { "db": "test", "coll": collection },
            "fullDocument": full_document,
        })
        .unwrap();
        self.push_event(collection, Ok(event))
    }

    /// Watching `collection` opens a stream that never yields.
    pub fn with_endless_watch(self, collection: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .endless
            .insert(collection.to_string());
        self
    }

    pub fn with_stream_error(self, collection: &str, message: &str) -> Self {
        self.push_event(collection, Err(message.to_string()))
    }

    fn push_event(self, collection: &str, event: Result<ChangeEvent, String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .events
            .entry(collection.to_string())
            .or_default()
            .push(event);
        self
    }

    pub fn insert_calls(&self, collection: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .insert_calls
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn watch_pipelines(&self) -> Vec<Vec<Document>> {
        self.state.lock().unwrap().watch_pipelines.clone()
    }

    pub fn stream_dropped(&self) -> bool {
        self.state.lock().unwrap().stream_dropped.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }
}

/// Change stream that stays open until dropped, and records the drop.
struct EndlessStream {
    dropped: Arc<AtomicBool>,
}

impl Stream for EndlessStream {
    type Item = Result<ChangeEvent, StoreError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Pending
    }
}

impl Drop for EndlessStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.state.lock().unwrap().unreachable {
            return Err("server unreachable".into());
        }
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<Bson, StoreError> {
        let mut state = self.state.lock().unwrap();
        *state.insert_calls.entry(collection.to_string()).or_default() += 1;

        if state.failing_inserts.contains(collection) {
            return Err(format!("write to {} rejected", collection).into());
        }

        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.unreachable {
            return Err("server unreachable".into());
        }
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, &filter)))
            .cloned())
    }

    async fn watch(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<EventStream, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err("server unreachable".into());
        }
        state.watch_pipelines.push(pipeline);

        if state.endless.contains(collection) {
            return Ok(EndlessStream {
                dropped: Arc::clone(&state.stream_dropped),
            }
            .boxed());
        }

        let events = state.events.remove(collection).unwrap_or_default();
        Ok(futures_util::stream::iter(
            events
                .into_iter()
                .map(|event| event.map_err(StoreError::from)),
        )
        .boxed())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.state.lock().unwrap().shut_down = true;
        Ok(())
    }
}

/// Wait until the watch task has opened its change stream.
pub async fn watch_opened(store: &MockStore) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while store.watch_pipelines().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("change stream was never opened");
}

/// Wait until the change stream handed out by the store has been dropped.
pub async fn stream_released(store: &MockStore) -> bool {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !store.stream_dropped() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

pub fn session(store: MockStore) -> Session<MockStore> {
    Session::new(store, AUDIT)
}
