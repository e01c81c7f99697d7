//! Registry of live document subscriptions.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::error::DataError;
use crate::remote::{Document, DocumentRef, ListenerEvent, ListenerSink, RemoteStore};

use super::types::{ChangeCallback, ErrorCallback, Listener, Subscriber, Subscription, Table};

/// Owns live listeners on individual documents and routes their snapshots.
///
/// Subscribing twice to the same document fans out: there is one remote
/// listener per `collection/id` key, and every `subscribe` call adds its own
/// callback with its own [`Subscription`] handle. The remote listener is
/// closed when the last callback for its key is cancelled, so no listener is
/// ever left running without a way to stop it.
///
/// A callback that joins an already-open key immediately receives the most
/// recent snapshot. Snapshots of one key reach each callback in the order
/// the store emitted them; there is no ordering across keys.
///
/// Listener failures are logged. Callbacks registered through
/// [`subscribe_with_errors`](Self::subscribe_with_errors) also receive them
/// as [`DataError::Subscription`].
pub struct SubscriptionRegistry {
  store: Arc<dyn RemoteStore>,
  table: Arc<Table>,
  next_id: AtomicU64,
}

impl SubscriptionRegistry {
  pub fn new(store: Arc<dyn RemoteStore>) -> Self {
    Self {
      store,
      table: Arc::new(Mutex::new(HashMap::new())),
      next_id: AtomicU64::new(1),
    }
  }

  /// Watch one document. `on_change` gets a full snapshot per change.
  pub fn subscribe<F>(&self, collection: &str, id: &str, on_change: F) -> Subscription
  where
    F: Fn(Document) + Send + Sync + 'static,
  {
    self.register(collection, id, Arc::new(on_change), None)
  }

  /// Like [`subscribe`](Self::subscribe), also receiving listener failures.
  pub fn subscribe_with_errors<F, E>(
    &self,
    collection: &str,
    id: &str,
    on_change: F,
    on_error: E,
  ) -> Subscription
  where
    F: Fn(Document) + Send + Sync + 'static,
    E: Fn(&DataError) + Send + Sync + 'static,
  {
    self.register(collection, id, Arc::new(on_change), Some(Arc::new(on_error)))
  }

  fn register(
    &self,
    collection: &str,
    id: &str,
    on_change: ChangeCallback,
    on_error: Option<ErrorCallback>,
  ) -> Subscription {
    let key = DocumentRef::new(collection, id).path();
    let subscriber_id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let subscriber = Arc::new(Subscriber::new(subscriber_id, on_change, on_error));
    let handle = Subscription::new(key.clone(), subscriber_id, Arc::downgrade(&self.table));

    let generation = {
      let mut table = self.table.lock();
      if let Some(listener) = table.get_mut(&key) {
        listener.subscribers.push(Arc::clone(&subscriber));
        let latest = listener.latest.clone();
        debug!(%key, subscribers = listener.subscribers.len(), "joined open listener");
        drop(table);
        if let Some((sequence, doc)) = latest {
          subscriber.deliver(sequence, doc);
        }
        return handle;
      }

      let generation = self.next_id.fetch_add(1, Ordering::SeqCst);
      table.insert(
        key.clone(),
        Listener {
          generation,
          subscribers: vec![subscriber],
          cancel: None,
          latest: None,
          sequence: 0,
        },
      );
      generation
    };

    // Opened outside the lock: the store may deliver the first snapshot
    // synchronously.
    let sink = listener_sink(Arc::downgrade(&self.table), key.clone(), generation);
    let cancel = self.store.open_listener(collection, id, sink);

    let stale = {
      let mut table = self.table.lock();
      match table.get_mut(&key) {
        Some(listener) if listener.generation == generation => {
          listener.cancel = Some(cancel);
          None
        }
        _ => Some(cancel),
      }
    };
    // Everyone left while the listener was opening.
    if let Some(cancel) = stale {
      cancel();
    }

    debug!(%key, "opened listener");
    handle
  }

  /// Close every listener and forget every callback.
  pub fn cancel_all(&self) {
    let listeners: Vec<_> = self.table.lock().drain().map(|(_, listener)| listener).collect();
    let count = listeners.len();
    for listener in listeners {
      for subscriber in &listener.subscribers {
        subscriber.deactivate();
      }
      if let Some(cancel) = listener.cancel {
        cancel();
      }
    }
    info!(count, "cancelled all subscriptions");
  }

  /// Number of open remote listeners.
  pub fn listener_count(&self) -> usize {
    self.table.lock().len()
  }

  /// Number of callbacks registered on one document.
  pub fn subscriber_count(&self, collection: &str, id: &str) -> usize {
    self
      .table
      .lock()
      .get(&DocumentRef::new(collection, id).path())
      .map_or(0, |listener| listener.subscribers.len())
  }
}

impl Drop for SubscriptionRegistry {
  fn drop(&mut self) {
    self.cancel_all();
  }
}

fn listener_sink(table: Weak<Table>, key: String, generation: u64) -> ListenerSink {
  Arc::new(move |event| {
    if let Some(table) = table.upgrade() {
      dispatch(&table, &key, generation, event);
    }
  })
}

/// Route one listener event to the callbacks registered for `key`.
///
/// Callbacks run outside the table lock so they may subscribe or cancel.
/// A subscriber cancelled after the copy below is skipped by its own gate.
fn dispatch(table: &Table, key: &str, generation: u64, event: ListenerEvent) {
  match event {
    ListenerEvent::Snapshot(snapshot) => {
      let (sequence, subscribers) = {
        let mut table = table.lock();
        let Some(listener) = table.get_mut(key) else {
          return;
        };
        if listener.generation != generation {
          return;
        }
        listener.sequence += 1;
        let sequence = listener.sequence;
        listener.latest = snapshot.clone().map(|doc| (sequence, doc));
        (sequence, listener.subscribers.clone())
      };
      // Deleted or never-existing documents are not delivered.
      let Some(doc) = snapshot else {
        return;
      };
      for subscriber in subscribers {
        subscriber.deliver(sequence, doc.clone());
      }
    }
    ListenerEvent::Error(source) => {
      warn!(%key, error = %source, "document subscription error");
      let subscribers = {
        let table = table.lock();
        match table.get(key) {
          Some(listener) if listener.generation == generation => listener.subscribers.clone(),
          _ => return,
        }
      };
      let error = DataError::Subscription {
        key: key.to_string(),
        source,
      };
      for subscriber in subscribers {
        subscriber.report(&error);
      }
    }
  }
}
