//! End-to-end behavior of the data service over the in-memory store.

use docbridge::batch::plan_chunks;
use docbridge::cache::CacheSource;
use docbridge::remote::memory::MemoryStore;
use docbridge::remote::{Direction, DocumentRef, Fields, FilterOp, WriteBatch, WriteOp};
use docbridge::{Config, DataError, DataService, PageRequest, QuerySpec, RemoteError};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn service_over(store: &Arc<MemoryStore>) -> DataService {
  DataService::new(store.clone(), &Config::default()).unwrap()
}

fn fields(value: Value) -> Fields {
  match value {
    Value::Object(map) => map,
    _ => panic!("expected object"),
  }
}

fn seed_tasks(store: &MemoryStore, count: usize) {
  for i in 0..count {
    store.set_document(
      "tasks",
      &format!("t{:04}", i),
      fields(json!({ "seq": i, "status": if i % 2 == 0 { "open" } else { "done" } })),
    );
  }
}

fn by_seq() -> QuerySpec {
  QuerySpec::new().order_by("seq", Direction::Ascending)
}

fn stage_seq(batch: &mut WriteBatch, seq: &usize, target: &DocumentRef) {
  batch.set(target, fields(json!({ "seq": seq })));
}

fn batch_seqs(batch: &WriteBatch) -> Vec<u64> {
  batch
    .ops()
    .iter()
    .filter_map(|op| match op {
      WriteOp::Set { fields, .. } => fields.get("seq").and_then(Value::as_u64),
      _ => None,
    })
    .collect()
}

#[tokio::test]
async fn test_page_size_is_respected_and_filters_apply() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 25);
  let service = service_over(&store);

  let open = by_seq().where_eq("status", "open");
  let page = service.query("tasks", &open, 10).await.unwrap();
  assert_eq!(page.len(), 10);
  assert!(page.has_more);
  assert!(page
    .items
    .iter()
    .all(|doc| doc.get("status") == Some(&json!("open"))));

  let rest = service.load_more(&page).await.unwrap().unwrap();
  assert_eq!(rest.len(), 3);
  assert!(!rest.has_more);
  assert!(service.load_more(&rest).await.unwrap().is_none());
}

#[tokio::test]
async fn test_exact_multiple_yields_one_empty_trailing_page() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 20);
  let service = service_over(&store);

  let first = service.query("tasks", &by_seq(), 10).await.unwrap();
  let second = service.load_more(&first).await.unwrap().unwrap();
  assert_eq!(second.len(), 10);
  assert!(second.has_more, "a full last page still reports more");

  let third = service.load_more(&second).await.unwrap().unwrap();
  assert!(third.is_empty());
  assert!(!third.has_more);
  assert_eq!(store.fetch_count(), 3);
}

#[tokio::test]
async fn test_pages_do_not_overlap() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 9);
  let service = service_over(&store);

  let range = QuerySpec::new()
    .where_op("seq", FilterOp::GreaterThanOrEqual, 2)
    .order_by("seq", Direction::Descending);
  let mut page = service.query("tasks", &range, 4).await.unwrap();
  let mut seqs: Vec<u64> = page.items.iter().map(|d| d.fields["seq"].as_u64().unwrap()).collect();
  while let Some(next) = service.load_more(&page).await.unwrap() {
    seqs.extend(next.items.iter().map(|d| d.fields["seq"].as_u64().unwrap()));
    page = next;
  }
  assert_eq!(seqs, vec![8, 7, 6, 5, 4, 3, 2]);
}

#[tokio::test]
async fn test_cache_hit_skips_fetch_until_cleared() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 5);
  let service = service_over(&store);

  let first = service.query("tasks", &by_seq(), 3).await.unwrap();
  let second = service.query("tasks", &by_seq(), 3).await.unwrap();
  assert_eq!(store.fetch_count(), 1);
  assert_eq!(second.next_cursor, first.next_cursor);

  service.clear_cache();
  let third = service
    .fetch_page(PageRequest::new("tasks", by_seq(), 3))
    .await
    .unwrap();
  assert_eq!(third.source, CacheSource::Network);
  assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_cached_page_ignores_remote_changes_within_ttl() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 2);
  let service = service_over(&store);

  let before = service.query("tasks", &by_seq(), 10).await.unwrap();
  service
    .add_document("tasks", fields(json!({ "seq": 99 })))
    .await
    .unwrap();
  let after = service.query("tasks", &by_seq(), 10).await.unwrap();
  assert_eq!(after.len(), before.len());

  service.clear_cache();
  let fresh = service.query("tasks", &by_seq(), 10).await.unwrap();
  assert_eq!(fresh.len(), 3);
}

#[tokio::test]
async fn test_zero_ttl_always_fetches() {
  let store = Arc::new(MemoryStore::new());
  seed_tasks(&store, 3);
  let mut config = Config::default();
  config.cache.ttl_secs = 0;
  let service = DataService::new(store.clone(), &config).unwrap();

  service.query("tasks", &by_seq(), 3).await.unwrap();
  service.query("tasks", &by_seq(), 3).await.unwrap();
  assert_eq!(store.fetch_count(), 2);
  assert_eq!(service.cached_entries(), 1);
}

#[tokio::test]
async fn test_query_errors_propagate() {
  let store = Arc::new(MemoryStore::new());
  let service = service_over(&store);
  store.fail_next_fetch(RemoteError::PermissionDenied("no access".into()));

  let err = service.query("tasks", &by_seq(), 5).await.unwrap_err();
  assert!(matches!(
    err,
    DataError::Remote(RemoteError::PermissionDenied(_))
  ));
}

#[tokio::test]
async fn test_document_crud_and_typed_decode() {
  #[derive(Debug, Deserialize)]
  struct Task {
    id: String,
    title: String,
    done: bool,
  }

  let store = Arc::new(MemoryStore::new());
  let service = service_over(&store);

  let id = service
    .add_document("tasks", fields(json!({ "title": "Fix roof", "done": false })))
    .await
    .unwrap();
  service
    .update_document("tasks", &id, fields(json!({ "done": true })))
    .await
    .unwrap();

  let task: Task = service
    .get_document("tasks", &id)
    .await
    .unwrap()
    .unwrap()
    .decode()
    .unwrap();
  assert_eq!(task.id, id);
  assert_eq!(task.title, "Fix roof");
  assert!(task.done);

  service.delete_document("tasks", &id).await.unwrap();
  assert!(store.document("tasks", &id).is_none());

  let err = service
    .update_document("tasks", &id, Fields::new())
    .await
    .unwrap_err();
  assert!(matches!(err, DataError::Remote(RemoteError::NotFound { .. })));
}

#[tokio::test]
async fn test_cancelled_subscription_receives_nothing_more() {
  let store = Arc::new(MemoryStore::new());
  store.set_document("units", "u1", fields(json!({ "rent": 1 })));
  let service = service_over(&store);

  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&seen);
  let sub = service.subscribe("units", "u1", move |doc| {
    sink.lock().push(doc.fields["rent"].clone());
  });

  service
    .update_document("units", "u1", fields(json!({ "rent": 2 })))
    .await
    .unwrap();
  sub.cancel();
  service
    .update_document("units", "u1", fields(json!({ "rent": 3 })))
    .await
    .unwrap();

  assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_snapshots_are_full_documents() {
  let store = Arc::new(MemoryStore::new());
  store.set_document("units", "u1", fields(json!({ "rent": 1, "floor": 4 })));
  let service = service_over(&store);

  let latest = Arc::new(Mutex::new(None));
  let sink = Arc::clone(&latest);
  let _sub = service.subscribe("units", "u1", move |doc| {
    *sink.lock() = Some(doc);
  });
  service
    .update_document("units", "u1", fields(json!({ "rent": 2 })))
    .await
    .unwrap();

  let doc = latest.lock().clone().unwrap();
  assert_eq!(doc.fields["rent"], json!(2));
  assert_eq!(doc.fields["floor"], json!(4));
}

#[tokio::test]
async fn test_duplicate_subscribe_shares_one_listener() {
  let store = Arc::new(MemoryStore::new());
  store.set_document("units", "u1", fields(json!({ "rent": 1 })));
  let service = service_over(&store);

  let count = Arc::new(Mutex::new((0, 0)));
  let (a, b) = (Arc::clone(&count), Arc::clone(&count));
  let first = service.subscribe("units", "u1", move |_| a.lock().0 += 1);
  let second = service.subscribe("units", "u1", move |_| b.lock().1 += 1);
  assert_eq!(store.listener_count("units", "u1"), 1);

  store.set_document("units", "u1", fields(json!({ "rent": 2 })));
  assert_eq!(*count.lock(), (2, 2));

  // Cancelling the first leaves the second running; nothing is orphaned.
  first.cancel();
  store.set_document("units", "u1", fields(json!({ "rent": 3 })));
  assert_eq!(*count.lock(), (2, 3));

  second.cancel();
  assert_eq!(store.listener_count("units", "u1"), 0);
  assert_eq!(service.subscriptions().listener_count(), 0);
}

#[tokio::test]
async fn test_cancel_all_subscriptions() {
  let store = Arc::new(MemoryStore::new());
  let service = service_over(&store);
  let _a = service.subscribe("units", "u1", |_| {});
  let _b = service.subscribe("units", "u2", |_| {});
  assert_eq!(service.subscriptions().listener_count(), 2);

  service.cancel_all_subscriptions();
  assert_eq!(service.subscriptions().listener_count(), 0);
  assert_eq!(store.listener_count("units", "u1"), 0);
  assert_eq!(store.listener_count("units", "u2"), 0);
}

#[tokio::test]
async fn test_batch_of_1200_commits_500_500_200_in_order() {
  let store = Arc::new(MemoryStore::new());
  let service = service_over(&store);
  let items: Vec<usize> = (0..1200).collect();

  assert_eq!(plan_chunks(items.len(), 500), vec![0..500, 500..1000, 1000..1200]);

  service
    .batch_write(&items, stage_seq, "readings")
    .await
    .unwrap();

  let mut commits = store.commits();
  assert_eq!(commits.len(), 3);
  commits.sort_by_key(|batch| batch_seqs(batch)[0]);
  let sizes: Vec<usize> = commits.iter().map(WriteBatch::len).collect();
  assert_eq!(sizes, vec![500, 500, 200]);

  let mut expected = 0u64;
  for batch in &commits {
    for seq in batch_seqs(batch) {
      assert_eq!(seq, expected);
      expected += 1;
    }
  }
  assert_eq!(expected, 1200);

  // Every item got its own fresh id.
  assert_eq!(store.len("readings"), 1200);
  // All three chunks were awaiting their commit together.
  assert_eq!(store.peak_commits_in_flight(), 3);
}

#[tokio::test]
async fn test_middle_chunk_failure_is_not_rolled_back_elsewhere() {
  let store = Arc::new(MemoryStore::new());
  store.fail_commits_when(|batch| batch_seqs(batch).contains(&700));
  let service = service_over(&store);
  let items: Vec<usize> = (0..1200).collect();

  let err = service
    .batch_write(&items, stage_seq, "readings")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    DataError::BatchAggregate {
      failed: 1,
      total: 3
    }
  ));

  // All three commits were attempted and the outer two persisted.
  assert_eq!(store.commit_attempts(), 3);
  assert_eq!(store.len("readings"), 700);

  let page = service.query("readings", &by_seq(), 1000).await.unwrap();
  let seqs: Vec<u64> = page.items.iter().map(|d| d.fields["seq"].as_u64().unwrap()).collect();
  let expected: Vec<u64> = (0..500).chain(1000..1200).collect();
  assert_eq!(seqs, expected);
}

#[tokio::test]
async fn test_tracked_batch_reports_partial_success() {
  let store = Arc::new(MemoryStore::new());
  store.fail_commits_when(|batch| batch_seqs(batch).contains(&700));
  let service = service_over(&store);
  let items: Vec<usize> = (0..1200).collect();

  let report = service
    .batch_write_tracked(&items, stage_seq, "readings")
    .await;
  let committed: Vec<bool> = report.chunks.iter().map(|c| c.is_committed()).collect();
  assert_eq!(committed, vec![true, false, true]);
  assert_eq!(report.committed_ids().count(), 700);
}

#[tokio::test]
async fn test_configured_chunk_size_is_used() {
  let store = Arc::new(MemoryStore::new());
  let config = Config::from_yaml("batch:\n  chunk_size: 100\n").unwrap();
  let service = DataService::new(store.clone(), &config).unwrap();
  let items: Vec<usize> = (0..250).collect();

  service
    .batch_write(&items, stage_seq, "readings")
    .await
    .unwrap();
  let mut sizes: Vec<usize> = store.commits().iter().map(WriteBatch::len).collect();
  sizes.sort_unstable();
  assert_eq!(sizes, vec![50, 100, 100]);
}
