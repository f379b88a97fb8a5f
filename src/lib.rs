//! Thin session wrapper around the MongoDB driver: connect with a bounded
//! timeout, insert, audited insert, find one, and forward insert events from
//! a change stream.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod payload;
pub mod session;
pub mod store;
pub mod watch;

pub use config::{Config, SessionConfig};
pub use error::{Result, SessionError, StoreError};
pub use event::ChangeEvent;
pub use session::{DualInsert, Session, WatchEnd};
pub use store::{DocumentStore, EventStream, MongoStore};
pub use watch::Watch;
