use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::event::ChangeEvent;
use crate::session::{Session, WatchEnd};
use crate::store::DocumentStore;

/// A change stream running on its own task.
///
/// Dropping the handle cancels the task.
pub struct Watch {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<WatchEnd>>,
}

impl<S: DocumentStore> Session<S> {
    /// Run [`watch_collection`](Session::watch_collection) in the background
    /// with a channel holding at most `capacity` unread events.
    pub fn spawn_watch(&self, collection: impl Into<String>, capacity: usize) -> Watch {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let (cancel, cancelled) = oneshot::channel::<()>();
        let session = self.clone();
        let collection = collection.into();

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled => {
                    tracing::info!("watch on {} cancelled", collection);
                    Ok(WatchEnd::Cancelled)
                }
                end = session.watch_collection(&collection, tx) => end,
            }
        });

        Watch {
            events,
            cancel: Some(cancel),
            task,
        }
    }
}

impl Watch {
    /// Next insert event, or `None` once the watch has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the watch and report how it ended.
    ///
    /// If the watch already finished on its own, its real outcome (or
    /// error) is returned instead of [`WatchEnd::Cancelled`].
    pub async fn cancel(mut self) -> Result<WatchEnd> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }

        match self.task.await {
            Ok(end) => end,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(WatchEnd::Cancelled),
        }
    }
}

impl Stream for Watch {
    type Item = ChangeEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}
