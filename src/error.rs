use std::time::Duration;

use crate::payload::PayloadError;

/// Error type produced by a [`DocumentStore`](crate::store::DocumentStore).
///
/// For [`MongoStore`](crate::store::MongoStore) this is always a boxed
/// `mongodb::error::Error` and can be downcast back to it.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot make connection to database")]
    Connect(#[source] StoreError),

    #[error("cannot reach database, ping failed")]
    Ping(#[source] StoreError),

    #[error("timed out connecting to database after {0:?}")]
    Timeout(Duration),

    #[error("payload could not be decoded")]
    Decode(#[from] PayloadError),

    #[error("payload could not be encoded as a document")]
    Encode(#[source] mongodb::bson::ser::Error),

    #[error("insert into `{collection}` failed")]
    Write {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("reading from `{collection}` failed")]
    Read {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("no documents in `{0}` matched the filter")]
    NoDocuments(String),

    #[error("document does not match the requested type")]
    Deserialize(#[source] mongodb::bson::de::Error),

    #[error("change stream on `{collection}` could not be opened")]
    WatchOpen {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("change stream on `{collection}` failed")]
    Watch {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("database client did not shut down cleanly")]
    Shutdown(#[source] StoreError),
}

impl SessionError {
    /// The driver error underneath, if this failure came from the store.
    pub fn store_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            SessionError::Connect(e) | SessionError::Ping(e) | SessionError::Shutdown(e) => {
                Some(e.as_ref())
            }
            SessionError::Write { source, .. }
            | SessionError::Read { source, .. }
            | SessionError::WatchOpen { source, .. }
            | SessionError::Watch { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
