//! In-process document store.
//!
//! `MemoryStore` implements the full [`RemoteStore`] contract: filtered and
//! ordered cursor pagination, per-document listeners, and atomic batch
//! commits. It also counts remote calls and can inject failures, which makes
//! it the test double for everything built on top of it.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use super::{
  Cursor, Direction, Document, DocumentRef, FetchedPage, Fields, Filter, FilterOp,
  ListenerCancel, ListenerEvent, ListenerSink, OrderBy, QuerySpec, RemoteStore, WriteBatch,
  WriteOp, MAX_BATCH_WRITES,
};
use crate::error::RemoteError;

type CommitPredicate = Arc<dyn Fn(&WriteBatch) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
  collections: BTreeMap<String, BTreeMap<String, Fields>>,
  listeners: HashMap<DocumentRef, Vec<(u64, ListenerSink)>>,
  commits: Vec<WriteBatch>,
  fail_commit: Option<CommitPredicate>,
  fail_fetch: Option<RemoteError>,
}

impl Inner {
  fn snapshot(&self, target: &DocumentRef) -> Option<Document> {
    self
      .collections
      .get(&target.collection)
      .and_then(|docs| docs.get(&target.id))
      .map(|fields| Document::new(target.id.clone(), fields.clone()))
  }

  fn exists(&self, target: &DocumentRef) -> bool {
    self
      .collections
      .get(&target.collection)
      .map_or(false, |docs| docs.contains_key(&target.id))
  }

  fn apply(&mut self, op: &WriteOp) {
    match op {
      WriteOp::Set { target, fields } => {
        self
          .collections
          .entry(target.collection.clone())
          .or_default()
          .insert(target.id.clone(), fields.clone());
      }
      WriteOp::Update { target, fields } => {
        if let Some(existing) = self
          .collections
          .get_mut(&target.collection)
          .and_then(|docs| docs.get_mut(&target.id))
        {
          for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
          }
        }
      }
      WriteOp::Delete { target } => {
        if let Some(docs) = self.collections.get_mut(&target.collection) {
          docs.remove(&target.id);
        }
      }
    }
  }
}

/// Document store kept entirely in memory.
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
  fetch_count: AtomicUsize,
  get_count: AtomicUsize,
  commit_attempts: AtomicUsize,
  commits_in_flight: AtomicUsize,
  peak_commits_in_flight: AtomicUsize,
  next_listener_id: AtomicU64,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner::default())),
      fetch_count: AtomicUsize::new(0),
      get_count: AtomicUsize::new(0),
      commit_attempts: AtomicUsize::new(0),
      commits_in_flight: AtomicUsize::new(0),
      peak_commits_in_flight: AtomicUsize::new(0),
      next_listener_id: AtomicU64::new(1),
    }
  }

  /// Create or replace a document and notify its listeners.
  ///
  /// This is the "someone else changed the data" entry point.
  pub fn set_document(&self, collection: &str, id: &str, fields: Fields) {
    let target = DocumentRef::new(collection, id);
    self.inner.lock().apply(&WriteOp::Set {
      target: target.clone(),
      fields,
    });
    self.notify([target]);
  }

  pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
    self.inner.lock().snapshot(&DocumentRef::new(collection, id))
  }

  /// All documents of a collection, ordered by id.
  pub fn documents(&self, collection: &str) -> Vec<Document> {
    self
      .inner
      .lock()
      .collections
      .get(collection)
      .map(|docs| {
        docs
          .iter()
          .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn len(&self, collection: &str) -> usize {
    self
      .inner
      .lock()
      .collections
      .get(collection)
      .map_or(0, BTreeMap::len)
  }

  /// Number of `fetch_page` calls served so far.
  pub fn fetch_count(&self) -> usize {
    self.fetch_count.load(AtomicOrdering::SeqCst)
  }

  /// Number of `get_document` calls served so far.
  pub fn get_count(&self) -> usize {
    self.get_count.load(AtomicOrdering::SeqCst)
  }

  pub fn commit_attempts(&self) -> usize {
    self.commit_attempts.load(AtomicOrdering::SeqCst)
  }

  /// Most commits that were awaiting completion at the same time.
  pub fn peak_commits_in_flight(&self) -> usize {
    self.peak_commits_in_flight.load(AtomicOrdering::SeqCst)
  }

  /// Successfully committed batches, in commit order.
  pub fn commits(&self) -> Vec<WriteBatch> {
    self.inner.lock().commits.clone()
  }

  /// Reject every future commit for which `predicate` returns true.
  pub fn fail_commits_when<F>(&self, predicate: F)
  where
    F: Fn(&WriteBatch) -> bool + Send + Sync + 'static,
  {
    self.inner.lock().fail_commit = Some(Arc::new(predicate));
  }

  /// Make the next `fetch_page` call fail with `error`.
  pub fn fail_next_fetch(&self, error: RemoteError) {
    self.inner.lock().fail_fetch = Some(error);
  }

  /// Number of open listeners on one document.
  pub fn listener_count(&self, collection: &str, id: &str) -> usize {
    self
      .inner
      .lock()
      .listeners
      .get(&DocumentRef::new(collection, id))
      .map_or(0, Vec::len)
  }

  /// Push a listener failure to every listener of one document.
  pub fn emit_listener_error(&self, collection: &str, id: &str, error: RemoteError) {
    let sinks = self.sinks_for(&DocumentRef::new(collection, id));
    for sink in sinks {
      sink(ListenerEvent::Error(error.clone()));
    }
  }

  fn sinks_for(&self, target: &DocumentRef) -> Vec<ListenerSink> {
    self
      .inner
      .lock()
      .listeners
      .get(target)
      .map(|sinks| sinks.iter().map(|(_, sink)| Arc::clone(sink)).collect())
      .unwrap_or_default()
  }

  /// Deliver the current state of each target to its listeners.
  ///
  /// Sinks run outside the lock so they may call back into the store.
  fn notify(&self, targets: impl IntoIterator<Item = DocumentRef>) {
    let targets: BTreeSet<DocumentRef> = targets.into_iter().collect();
    let mut deliveries = Vec::new();
    {
      let inner = self.inner.lock();
      for target in &targets {
        if let Some(sinks) = inner.listeners.get(target) {
          let snapshot = inner.snapshot(target);
          for (_, sink) in sinks {
            deliveries.push((Arc::clone(sink), snapshot.clone()));
          }
        }
      }
    }
    for (sink, snapshot) in deliveries {
      sink(ListenerEvent::Snapshot(snapshot));
    }
  }

  fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..20].to_string()
  }
}

#[async_trait]
impl RemoteStore for MemoryStore {
  async fn fetch_page(
    &self,
    collection: &str,
    query: &QuerySpec,
    limit: usize,
    cursor: Option<&Cursor>,
  ) -> Result<FetchedPage, RemoteError> {
    self.fetch_count.fetch_add(1, AtomicOrdering::SeqCst);
    let docs = {
      let mut inner = self.inner.lock();
      if let Some(error) = inner.fail_fetch.take() {
        return Err(error);
      }
      inner.collections.get(collection).cloned().unwrap_or_default()
    };

    let mut rows: Vec<(Vec<Value>, Document)> = docs
      .into_iter()
      .filter(|(_, fields)| query.filters.iter().all(|f| matches_filter(fields, f)))
      .filter_map(|(id, fields)| {
        let key = sort_values(&fields, &query.order_by)?;
        Some((key, Document::new(id, fields)))
      })
      .collect();
    rows.sort_by(|(ka, a), (kb, b)| compare_keys(ka, &a.id, kb, &b.id, &query.order_by));

    let start = match cursor {
      Some(cursor) => {
        let position = decode_cursor(cursor)?;
        rows
          .iter()
          .position(|(key, doc)| {
            compare_keys(key, &doc.id, &position.values, &position.id, &query.order_by)
              == Ordering::Greater
          })
          .unwrap_or(rows.len())
      }
      None => 0,
    };

    let page: Vec<(Vec<Value>, Document)> = rows.into_iter().skip(start).take(limit).collect();
    let cursor = page
      .last()
      .map(|(values, doc)| encode_cursor(values, &doc.id))
      .transpose()?;

    trace!(collection, returned = page.len(), "memory fetch_page");
    Ok(FetchedPage {
      documents: page.into_iter().map(|(_, doc)| doc).collect(),
      cursor,
    })
  }

  async fn get_document(
    &self,
    collection: &str,
    id: &str,
  ) -> Result<Option<Document>, RemoteError> {
    self.get_count.fetch_add(1, AtomicOrdering::SeqCst);
    Ok(self.document(collection, id))
  }

  async fn add_document(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
    let target = self.new_document_ref(collection);
    self.inner.lock().apply(&WriteOp::Set {
      target: target.clone(),
      fields,
    });
    let id = target.id.clone();
    self.notify([target]);
    Ok(id)
  }

  async fn update_document(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<(), RemoteError> {
    let target = DocumentRef::new(collection, id);
    {
      let mut inner = self.inner.lock();
      if !inner.exists(&target) {
        return Err(RemoteError::NotFound {
          collection: collection.to_string(),
          id: id.to_string(),
        });
      }
      inner.apply(&WriteOp::Update {
        target: target.clone(),
        fields,
      });
    }
    self.notify([target]);
    Ok(())
  }

  async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
    let target = DocumentRef::new(collection, id);
    self.inner.lock().apply(&WriteOp::Delete {
      target: target.clone(),
    });
    self.notify([target]);
    Ok(())
  }

  fn open_listener(&self, collection: &str, id: &str, sink: ListenerSink) -> ListenerCancel {
    let target = DocumentRef::new(collection, id);
    let listener_id = self.next_listener_id.fetch_add(1, AtomicOrdering::SeqCst);
    let snapshot = {
      let mut inner = self.inner.lock();
      inner
        .listeners
        .entry(target.clone())
        .or_default()
        .push((listener_id, Arc::clone(&sink)));
      inner.snapshot(&target)
    };
    sink(ListenerEvent::Snapshot(snapshot));

    let weak = Arc::downgrade(&self.inner);
    Box::new(move || {
      let Some(inner) = weak.upgrade() else {
        return;
      };
      let mut inner = inner.lock();
      let now_empty = match inner.listeners.get_mut(&target) {
        Some(sinks) => {
          sinks.retain(|(id, _)| *id != listener_id);
          sinks.is_empty()
        }
        None => false,
      };
      if now_empty {
        inner.listeners.remove(&target);
      }
    })
  }

  fn new_document_ref(&self, collection: &str) -> DocumentRef {
    DocumentRef::new(collection, Self::new_id())
  }

  async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError> {
    self.commit_attempts.fetch_add(1, AtomicOrdering::SeqCst);
    let in_flight = self.commits_in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
    self
      .peak_commits_in_flight
      .fetch_max(in_flight, AtomicOrdering::SeqCst);
    // Let sibling commits interleave like real network calls would.
    tokio::task::yield_now().await;
    self.commits_in_flight.fetch_sub(1, AtomicOrdering::SeqCst);

    if batch.len() > MAX_BATCH_WRITES {
      return Err(RemoteError::Aborted(format!(
        "batch of {} writes exceeds the limit of {}",
        batch.len(),
        MAX_BATCH_WRITES
      )));
    }

    let targets: Vec<DocumentRef> = {
      let mut inner = self.inner.lock();
      if let Some(predicate) = inner.fail_commit.clone() {
        if predicate(&batch) {
          return Err(RemoteError::Aborted("injected commit failure".to_string()));
        }
      }
      for op in batch.ops() {
        if let WriteOp::Update { target, .. } = op {
          let created_earlier = batch.ops().iter().any(
            |other| matches!(other, WriteOp::Set { target: t, .. } if t == target),
          );
          if !inner.exists(target) && !created_earlier {
            return Err(RemoteError::NotFound {
              collection: target.collection.clone(),
              id: target.id.clone(),
            });
          }
        }
      }
      for op in batch.ops() {
        inner.apply(op);
      }
      let targets = batch.ops().iter().map(|op| op.target().clone()).collect();
      inner.commits.push(batch);
      targets
    };

    self.notify(targets);
    Ok(())
  }
}

/// Position encoded inside a [`Cursor`] produced by this store.
#[derive(Serialize, Deserialize)]
struct CursorPosition {
  values: Vec<Value>,
  id: String,
}

fn encode_cursor(values: &[Value], id: &str) -> Result<Cursor, RemoteError> {
  let position = CursorPosition {
    values: values.to_vec(),
    id: id.to_string(),
  };
  serde_json::to_string(&position)
    .map(Cursor::new)
    .map_err(|e| RemoteError::Internal(format!("failed to encode cursor: {}", e)))
}

fn decode_cursor(cursor: &Cursor) -> Result<CursorPosition, RemoteError> {
  serde_json::from_str(cursor.as_str())
    .map_err(|e| RemoteError::Internal(format!("invalid cursor: {}", e)))
}

/// Values of the ordered fields, or `None` when one is missing.
///
/// Documents lacking an ordered field are excluded from ordered queries.
fn sort_values(fields: &Fields, order_by: &[OrderBy]) -> Option<Vec<Value>> {
  order_by
    .iter()
    .map(|order| fields.get(&order.field).cloned())
    .collect()
}

fn compare_keys(
  values_a: &[Value],
  id_a: &str,
  values_b: &[Value],
  id_b: &str,
  order_by: &[OrderBy],
) -> Ordering {
  for ((a, b), order) in values_a.iter().zip(values_b).zip(order_by) {
    let ordering = apply_direction(compare_values(a, b), order.direction);
    if ordering != Ordering::Equal {
      return ordering;
    }
  }
  // Ties break on id, in the direction of the last ordering.
  let direction = order_by
    .last()
    .map(|order| order.direction)
    .unwrap_or_default();
  apply_direction(id_a.cmp(id_b), direction)
}

fn apply_direction(ordering: Ordering, direction: Direction) -> Ordering {
  match direction {
    Direction::Ascending => ordering,
    Direction::Descending => ordering.reverse(),
  }
}

fn type_rank(value: &Value) -> u8 {
  match value {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
  match (a, b) {
    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
    (Value::Number(x), Value::Number(y)) => {
      let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
      x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
    (Value::String(x), Value::String(y)) => x.cmp(y),
    (Value::Array(x), Value::Array(y)) => x
      .iter()
      .zip(y)
      .map(|(a, b)| compare_values(a, b))
      .find(|ordering| *ordering != Ordering::Equal)
      .unwrap_or_else(|| x.len().cmp(&y.len())),
    (Value::Object(_), Value::Object(_)) if a == b => Ordering::Equal,
    (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
    _ => type_rank(a).cmp(&type_rank(b)),
  }
}

fn values_equal(a: &Value, b: &Value) -> bool {
  type_rank(a) == type_rank(b) && compare_values(a, b) == Ordering::Equal
}

/// Range comparisons only match values of the same type.
fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
  (type_rank(a) == type_rank(b)).then(|| compare_values(a, b))
}

fn matches_filter(fields: &Fields, filter: &Filter) -> bool {
  let Some(actual) = fields.get(&filter.field) else {
    return false;
  };
  let expected = &filter.value;
  match filter.op {
    FilterOp::Equal => values_equal(actual, expected),
    FilterOp::NotEqual => !values_equal(actual, expected),
    FilterOp::LessThan => compare_same_type(actual, expected) == Some(Ordering::Less),
    FilterOp::LessThanOrEqual => matches!(
      compare_same_type(actual, expected),
      Some(Ordering::Less | Ordering::Equal)
    ),
    FilterOp::GreaterThan => compare_same_type(actual, expected) == Some(Ordering::Greater),
    FilterOp::GreaterThanOrEqual => matches!(
      compare_same_type(actual, expected),
      Some(Ordering::Greater | Ordering::Equal)
    ),
    FilterOp::ArrayContains => actual
      .as_array()
      .map_or(false, |items| items.iter().any(|item| values_equal(item, expected))),
    FilterOp::In => expected
      .as_array()
      .map_or(false, |choices| choices.iter().any(|c| values_equal(actual, c))),
  }
}
