//! Remote document store abstraction.
//!
//! Any backend (a managed document database, a self-hosted compatible store,
//! or the in-process [`memory::MemoryStore`]) plugs into the access layer by
//! implementing [`RemoteStore`].

pub mod memory;
mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RemoteError;

pub use types::{
  Cursor, Direction, Document, DocumentRef, FetchedPage, Fields, Filter, FilterOp, OrderBy,
  QuerySpec, WriteBatch, WriteOp, MAX_BATCH_WRITES,
};

/// Event pushed by a document listener.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
  /// Full current state of the document, `None` if it does not exist.
  Snapshot(Option<Document>),
  /// The listener failed after being established.
  Error(RemoteError),
}

/// Receiver of listener events. Called once per remote change, in order.
pub type ListenerSink = Arc<dyn Fn(ListenerEvent) + Send + Sync>;

/// Stops a listener. After it returns the sink receives no further events.
pub type ListenerCancel = Box<dyn FnOnce() + Send>;

/// Capabilities the access layer needs from a remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Fetch at most `limit` documents matching `query`, starting after `cursor`.
  async fn fetch_page(
    &self,
    collection: &str,
    query: &QuerySpec,
    limit: usize,
    cursor: Option<&Cursor>,
  ) -> Result<FetchedPage, RemoteError>;

  async fn get_document(&self, collection: &str, id: &str)
    -> Result<Option<Document>, RemoteError>;

  /// Create a document with a store-assigned id and return that id.
  async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, RemoteError>;

  /// Merge `fields` into an existing document.
  async fn update_document(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<(), RemoteError>;

  async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

  /// Start listening to one document.
  ///
  /// Implementations deliver the current state first, then one snapshot per
  /// change, in the order the changes happened.
  fn open_listener(&self, collection: &str, id: &str, sink: ListenerSink) -> ListenerCancel;

  /// Allocate a fresh document identity without writing anything.
  fn new_document_ref(&self, collection: &str) -> DocumentRef;

  fn new_write_batch(&self) -> WriteBatch {
    WriteBatch::new()
  }

  /// Commit a batch atomically.
  async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError>;
}
