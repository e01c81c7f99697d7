//! Subscription handle and callback types.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::DataError;
use crate::remote::{Document, ListenerCancel};

/// Receives the full current state of a document after every change.
pub type ChangeCallback = Arc<dyn Fn(Document) + Send + Sync>;

/// Receives listener failures.
pub type ErrorCallback = Arc<dyn Fn(&DataError) + Send + Sync>;

pub(crate) struct Subscriber {
  pub(crate) id: u64,
  pub(crate) on_change: ChangeCallback,
  pub(crate) on_error: Option<ErrorCallback>,
  /// Sequence number of the last snapshot handed to `on_change`.
  delivered: AtomicU64,
  active: AtomicBool,
  /// Held while a callback runs. Reentrant so a callback may cancel itself.
  gate: ReentrantMutex<()>,
}

impl Subscriber {
  pub(crate) fn new(id: u64, on_change: ChangeCallback, on_error: Option<ErrorCallback>) -> Self {
    Self {
      id,
      on_change,
      on_error,
      delivered: AtomicU64::new(0),
      active: AtomicBool::new(true),
      gate: ReentrantMutex::new(()),
    }
  }

  /// Deliver a snapshot unless a newer one already reached this subscriber.
  pub(crate) fn deliver(&self, sequence: u64, doc: Document) {
    let _gate = self.gate.lock();
    if !self.active.load(Ordering::SeqCst) {
      return;
    }
    if self.delivered.fetch_max(sequence, Ordering::SeqCst) < sequence {
      (self.on_change)(doc);
    }
  }

  pub(crate) fn report(&self, error: &DataError) {
    let _gate = self.gate.lock();
    if !self.active.load(Ordering::SeqCst) {
      return;
    }
    if let Some(on_error) = &self.on_error {
      on_error(error);
    }
  }

  /// Stop all further callbacks. Waits for one running on another thread.
  pub(crate) fn deactivate(&self) {
    let _gate = self.gate.lock();
    self.active.store(false, Ordering::SeqCst);
  }
}

/// One remote listener and every callback fanned out from it.
pub(crate) struct Listener {
  /// Distinguishes this listener from earlier ones on the same key.
  pub(crate) generation: u64,
  pub(crate) subscribers: Vec<Arc<Subscriber>>,
  /// `None` while the remote listener is still being opened.
  pub(crate) cancel: Option<ListenerCancel>,
  pub(crate) latest: Option<(u64, Document)>,
  pub(crate) sequence: u64,
}

pub(crate) type Table = Mutex<HashMap<String, Listener>>;

/// Remove one subscriber, closing the remote listener after the last one.
///
/// Once this returns the subscriber's callbacks will not run again.
pub(crate) fn remove_subscriber(table: &Table, key: &str, subscriber_id: u64) -> bool {
  let (removed, cancel) = {
    let mut table = table.lock();
    let Some(listener) = table.get_mut(key) else {
      return false;
    };
    let removed = listener
      .subscribers
      .iter()
      .position(|s| s.id == subscriber_id)
      .map(|index| listener.subscribers.remove(index));
    let cancel = if listener.subscribers.is_empty() {
      table.remove(key).and_then(|listener| listener.cancel)
    } else {
      None
    };
    (removed, cancel)
  };
  // Outside the table lock: a running callback may itself need it.
  if let Some(subscriber) = &removed {
    subscriber.deactivate();
  }
  if let Some(cancel) = cancel {
    cancel();
  }
  removed.is_some()
}

/// Handle to one registered callback.
///
/// Dropping the handle leaves the subscription active; call
/// [`cancel`](Subscription::cancel) to stop deliveries.
#[must_use = "dropping a Subscription does not cancel it"]
pub struct Subscription {
  key: String,
  subscriber_id: u64,
  table: Weak<Table>,
}

impl Subscription {
  pub(crate) fn new(key: String, subscriber_id: u64, table: Weak<Table>) -> Self {
    Self {
      key,
      subscriber_id,
      table,
    }
  }

  /// `collection/id` of the watched document.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Stop deliveries to this callback.
  ///
  /// Returns `false` if it was no longer registered, e.g. after
  /// `cancel_all`.
  pub fn cancel(self) -> bool {
    match self.table.upgrade() {
      Some(table) => remove_subscriber(&table, &self.key, self.subscriber_id),
      None => false,
    }
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("subscriber_id", &self.subscriber_id)
      .finish()
  }
}
